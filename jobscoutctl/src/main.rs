use clap::Parser;

fn main() {
    let cli = jobscoutctl::Cli::parse();
    if let Err(err) = jobscoutctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
