#![forbid(unsafe_code)]

fn main() {
    std::process::exit(synapse_notify_cli::run());
}
