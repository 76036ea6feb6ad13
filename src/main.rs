fn main() -> anyhow::Result<()> {
  fxaudition_lib::run()
}
