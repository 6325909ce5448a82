fn main() {
    if let Err(e) = gradebox::cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(gradebox::cli::exit_code(&e));
    }
}
