fn main() {
    if let Err(err) = dashstash::run() {
        log::error!("{:#}", err);
        eprintln!("dashstash: {:#}", err);
        std::process::exit(dashstash_core::errors::exit_code_for(&err));
    }
}
