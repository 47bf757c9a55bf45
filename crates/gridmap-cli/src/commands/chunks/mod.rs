use anyhow::{anyhow, Result};
use gridmap_batch::{ChunkCutter, ChunkRange};

pub fn handle(
    first: i64,
    last: Option<i64>,
    ranges: &[ChunkRange],
    size: i64,
    index: Option<i64>,
    point: Option<i64>,
) -> Result<()> {
    let cutter = if ranges.is_empty() {
        let last = last.ok_or_else(|| anyhow!("--last is required without --range"))?;
        ChunkCutter::new(first, last, size)?
    } else {
        ChunkCutter::from_ranges(ranges.to_vec(), size)?
    };
    match (index, point) {
        (Some(index), _) => {
            let range = cutter.chunk_range(index);
            println!("[{}, {}]", range.first, range.last);
        }
        (None, Some(point)) => match cutter.chunk_of(point) {
            Some(chunk) => println!("{chunk}"),
            None => return Err(anyhow!("point {point} is outside every range")),
        },
        (None, None) => {
            println!("{} chunks", cutter.chunk_count());
            for (i, range) in cutter.ranges().enumerate() {
                println!("{i:>6}  [{}, {}]", range.first, range.last);
            }
        }
    }
    Ok(())
}
