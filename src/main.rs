fn main() {
    if let Err(err) = csv_pick::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
