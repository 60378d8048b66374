mod app;
mod cli;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::fmt;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(cli::env_filter(cli.verbose))
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.experiment_config()?;

    println!("=== DIGIT N-BACK TEST ===");
    println!("Platform: {}", std::env::consts::OS);
    println!("Architecture: {}", std::env::consts::ARCH);
    println!(
        "Sequence: {} stimuli, {} forced matches, {} ms on / {} ms blank",
        config.sequence_length,
        config.forced_matches,
        config.stimulus_duration_ms,
        config.blank_duration_ms
    );
    println!("Annotations: {}\n", cli.annotations.display());

    app::run(&cli, config)
}
