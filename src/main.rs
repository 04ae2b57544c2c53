use std::path::PathBuf;
use std::process;

use clap::Parser;

use marklar::diagnostic::render_diagnostics;
use marklar::driver;

#[derive(Parser)]
#[command(
    name = "marklarc",
    version,
    about = "Marklar compiler: source file in, native executable out"
)]
struct Cli {
    /// Marklar source file to compile
    #[arg(short = 'i', long = "input-file")]
    input_file: PathBuf,
    /// Output executable path
    #[arg(short = 'o', long = "output-file", default_value = "a.out")]
    output_file: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.input_file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", cli.input_file.display(), e);
            process::exit(1);
        }
    };
    let filename = cli.input_file.display().to_string();

    let bitcode = PathBuf::from("output.bc");
    match driver::generate_output(&source, &bitcode) {
        Ok(warnings) => render_diagnostics(&warnings, &filename, &source),
        Err(diagnostics) => {
            render_diagnostics(&diagnostics, &filename, &source);
            process::exit(1);
        }
    }

    if let Err(diagnostic) = driver::optimize_and_link(&bitcode, &cli.output_file) {
        diagnostic.render(&filename, &source);
        process::exit(1);
    }

    eprintln!("Compiled -> {}", cli.output_file.display());
}
