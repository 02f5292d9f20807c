use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = citewalk_api::Args::parse();

	citewalk_api::run(args).await
}
