//! `chromabound` binary entry point.

fn main() -> anyhow::Result<()> {
    chromabound_cli::run()
}
