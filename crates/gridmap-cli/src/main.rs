use clap::Parser;
use gridmap_cli::cli::{Cli, Commands};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }

    let result = match &cli.command {
        Some(Commands::Map(args)) => {
            info!(
                "Mapping {} onto {}",
                args.inputs.timeseries.display(),
                args.inputs.network.display()
            );
            commands::map::handle(args)
        }
        Some(Commands::Batch(args)) => {
            info!(
                "Mapping {} onto {} in chunks of {}",
                args.inputs.timeseries.display(),
                args.inputs.network.display(),
                args.chunk_size
            );
            commands::batch::handle(args)
        }
        Some(Commands::Chunks {
            first,
            last,
            range,
            size,
            index,
            point,
        }) => commands::chunks::handle(*first, *last, range, *size, *index, *point),
        Some(Commands::Variables { kind }) => commands::variables::handle(kind.as_deref()),
        None => {
            info!("No subcommand provided. Use `gridmap --help` for more information.");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Command failed: {:?}", e);
        std::process::exit(1);
    }
}
