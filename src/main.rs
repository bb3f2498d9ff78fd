fn main() -> Result<(), Box<dyn std::error::Error>> {
    llmux::cli::main()
}
