fn main() {
    if let Err(err) = valet::cli::main() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
