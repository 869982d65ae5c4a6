fn main() {
    if let Err(error) = tasktrack_lib::run() {
        eprintln!("tasktrack: {error}");
        std::process::exit(1);
    }
}
