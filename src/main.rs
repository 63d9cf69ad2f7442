fn main() {
    env_logger::init();

    let args = std::env::args().skip(1);
    if let Err(err) = luxld::cli::run(args) {
        let prog_name = std::env::args()
            .next()
            .unwrap_or_else(|| "luxld".to_string());
        eprintln!("{prog_name}: error: {err}");
        std::process::exit(1);
    }
}
