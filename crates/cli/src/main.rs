use crate::commands::{App, Command};
use anyhow::Result;
use clap::Parser;

mod batch;
mod commands;
mod context;
mod display;
mod values;

fn main() -> Result<()> {
    env_logger::init();
    App::parse().execute()
}
