pub mod import;
pub mod redact;
pub mod repo;
pub mod serve;

/// Progress lines go to stderr so stdout stays machine-readable
pub fn print_progress(message: &str) {
    eprintln!("{}", message);
}
