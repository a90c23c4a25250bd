use anyhow::Result;
use clap::Parser;
use galaxy_transfer::cli::{DownloadCli, init_logging};
use galaxy_transfer::{ConsoleReporter, download_all};

fn main() -> Result<()> {
    let cli = DownloadCli::parse();
    init_logging(cli.connection.verbose);

    let client = cli.connection.connect()?;
    let summary = download_all(&client, &cli.filter(), &cli.filepath, &mut ConsoleReporter)?;

    if summary.total() > 0 {
        eprintln!("{}", summary);
    }
    std::process::exit(summary.exit_code());
}
