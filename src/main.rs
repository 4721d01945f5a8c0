use std::path::PathBuf;
use std::process;

use clap::Parser;

use jackc::driver;

#[derive(Parser)]
#[command(name = "jackc", version, about = "Jack compiler targeting the Hack VM")]
struct Cli {
    /// Input .jack file or directory of .jack files
    input: PathBuf,
    /// Run the full pipeline without writing .vm files
    #[arg(long)]
    check: bool,
}

fn main() {
    let cli = Cli::parse();

    let files = match driver::jack_files(&cli.input) {
        Ok(files) => files,
        Err(err) => {
            err.report();
            process::exit(1);
        }
    };

    for file in &files {
        if cli.check {
            match driver::check_file(file) {
                Ok(()) => eprintln!("OK: {}", file.display()),
                Err(err) => {
                    err.report();
                    process::exit(1);
                }
            }
        } else {
            match driver::compile_file(file) {
                Ok(out_path) => eprintln!("Compiled -> {}", out_path.display()),
                Err(err) => {
                    err.report();
                    process::exit(1);
                }
            }
        }
    }
}
