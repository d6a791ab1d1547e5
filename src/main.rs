use anyhow::Result;
use clap::Parser;
use loopless::{CLIArguments, augment_main, components_main};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CLIArguments::parse();

    match args {
        CLIArguments::Augment(args) => augment_main(args),
        CLIArguments::Components(args) => components_main(args),
    }
}
