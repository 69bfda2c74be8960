fn main() {
    if let Err(e) = vmpilot_lib::run() {
        eprintln!("vmpilot: {e}");
        std::process::exit(1);
    }
}
