use anyhow::Result;
use clap::Parser;
use galaxy_transfer::cli::{UploadCli, init_logging};
use galaxy_transfer::{ConsoleReporter, upload_all};

fn main() -> Result<()> {
    let cli = UploadCli::parse();
    init_logging(cli.connection.verbose);

    let client = cli.connection.connect()?;
    let items = cli.items()?;
    let summary = upload_all(&client, items, &cli.options(), &mut ConsoleReporter);

    eprintln!("{}", summary);
    std::process::exit(summary.exit_code());
}
