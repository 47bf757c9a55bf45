use std::io::{self, Write};

use anyhow::Result;
use gridmap_core::{compatible_variables, default_variables, EquipmentKind, MetrixVariable};
use tabwriter::TabWriter;

pub fn handle(kind: Option<&str>) -> Result<()> {
    let kinds = match kind {
        Some(kind) => vec![kind.parse::<EquipmentKind>()?],
        None => EquipmentKind::ALL.to_vec(),
    };
    let mut tw = TabWriter::new(io::stdout());
    writeln!(tw, "KIND\tVARIABLE\tDEFAULT")?;
    for kind in kinds {
        let defaults = default_variables(kind);
        for variable in compatible_variables(kind) {
            let default = if defaults.contains(variable) { "yes" } else { "" };
            writeln!(tw, "{kind}\t{variable}\t{default}")?;
        }
    }
    tw.flush()?;

    if kind.is_none() {
        println!();
        println!("Optimizer variables (not applied to the network):");
        for variable in MetrixVariable::ALL {
            println!("  {variable}");
        }
    }
    Ok(())
}
