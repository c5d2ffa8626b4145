fn main() -> anyhow::Result<()> {
    stripebench_cli::cli::execute()
}
