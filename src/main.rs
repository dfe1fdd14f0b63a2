fn main() -> anyhow::Result<()> {
    gwas_pipeline::cli::run()
}
