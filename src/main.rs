use clap::Parser;
use env_logger::Env;

use sectionlens::Opts;
use sectionlens::cli::SubCommandExtend;
use sectionlens::config::SubCommand;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Import(config) => config.run(&opts).await,
        SubCommand::Label(config) => config.run(&opts).await,
        SubCommand::Related(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Show(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
