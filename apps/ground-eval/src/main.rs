use clap::Parser;

use ground_eval::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	ground_eval::run(args).await
}
