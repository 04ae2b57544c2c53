//! Compilation driver: source text to bitcode, then the external
//! optimize/assemble/link pipeline.
//!
//! The toolchain half shells out to `opt`, `llc`, and `gcc`; their
//! presence and behavior is an external contract, and any failure is
//! reported with the exit status of the command that failed.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::process::Command;

use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::ir::bitcode;

/// Parse, lower, verify, and write the module to `bitcode_path`.
///
/// On success the returned diagnostics are warnings only.
pub fn generate_output(source: &str, bitcode_path: &Path) -> Result<Vec<Diagnostic>, Vec<Diagnostic>> {
    let (module, warnings) = crate::compile_to_module(source)?;

    let file = File::create(bitcode_path).map_err(|e| {
        vec![Diagnostic::error(
            ErrorKind::Toolchain,
            format!("cannot write '{}': {}", bitcode_path.display(), e),
        )]
    })?;
    let mut out = BufWriter::new(file);
    bitcode::write_bitcode(&module, &mut out).map_err(|e| {
        vec![Diagnostic::error(
            ErrorKind::Toolchain,
            format!("cannot write '{}': {}", bitcode_path.display(), e),
        )]
    })?;

    Ok(warnings)
}

/// Run the external optimizer, assembler, and linker over a bitcode file.
pub fn optimize_and_link(bitcode_path: &Path, exe_path: &Path) -> Result<(), Diagnostic> {
    let opt_bc = bitcode_path.with_file_name("output_opt.bc");
    let obj = bitcode_path.with_file_name("output.o");

    run_tool("opt", &opt_args(bitcode_path, &opt_bc))?;
    run_tool("llc", &llc_args(&opt_bc, &obj))?;
    // gcc only for its default link line; the system linker needs more options
    run_tool("gcc", &link_args(&obj, exe_path))?;
    Ok(())
}

fn opt_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-O3".to_string(),
        "-loop-unroll".to_string(),
        "-loop-vectorize".to_string(),
        "-slp-vectorizer".to_string(),
        "-o".to_string(),
        output.display().to_string(),
        input.display().to_string(),
    ]
}

fn llc_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-relocation-model=pic".to_string(),
        "-filetype=obj".to_string(),
        "-o".to_string(),
        output.display().to_string(),
        input.display().to_string(),
    ]
}

fn link_args(object: &Path, exe: &Path) -> Vec<String> {
    vec![
        "-o".to_string(),
        exe.display().to_string(),
        object.display().to_string(),
    ]
}

fn run_tool(program: &str, args: &[String]) -> Result<(), Diagnostic> {
    match Command::new(program).args(args).status() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(Diagnostic::error(
            ErrorKind::Toolchain,
            format!("'{} {}' failed with {}", program, args.join(" "), status),
        )),
        Err(e) => Err(Diagnostic::error(
            ErrorKind::Toolchain,
            format!("could not run '{}': {}", program, e),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_output_writes_framed_bitcode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("output.bc");
        let warnings =
            generate_output("i32 main() { return 3; }", &path).expect("program compiles");
        assert!(warnings.is_empty());
        let bytes = std::fs::read(&path).expect("bitcode file written");
        assert_eq!(&bytes[0..4], b"MKBC");
    }

    #[test]
    fn test_generate_output_forwards_warnings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("output.bc");
        let warnings = generate_output(
            "i32 main() { i32 a = 1; if (1 == 1) { i32 a = 2; } return a; }",
            &path,
        )
        .expect("program compiles");
        assert!(warnings.iter().any(|d| d.message.contains("shadows")));
    }

    #[test]
    fn test_generate_output_fails_on_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("output.bc");
        let result = generate_output("i32 main( { return 3; }", &path);
        assert!(result.is_err());
        assert!(!path.exists(), "no bitcode on failure");
    }

    #[test]
    fn test_generate_output_fails_on_codegen_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("output.bc");
        let result = generate_output("i32 main() { return x; }", &path);
        let diagnostics = result.expect_err("unresolved symbol must fail");
        assert!(diagnostics
            .iter()
            .any(|d| d.kind == Some(ErrorKind::UnresolvedSymbol)));
    }

    #[test]
    fn test_opt_command_line() {
        let args = opt_args(Path::new("output.bc"), Path::new("output_opt.bc"));
        assert_eq!(
            args,
            vec![
                "-O3",
                "-loop-unroll",
                "-loop-vectorize",
                "-slp-vectorizer",
                "-o",
                "output_opt.bc",
                "output.bc",
            ]
        );
    }

    #[test]
    fn test_llc_command_line() {
        let args = llc_args(Path::new("output_opt.bc"), Path::new("output.o"));
        assert_eq!(
            args,
            vec![
                "-relocation-model=pic",
                "-filetype=obj",
                "-o",
                "output.o",
                "output_opt.bc",
            ]
        );
    }

    #[test]
    fn test_link_command_line() {
        let args = link_args(Path::new("output.o"), Path::new("a.out"));
        assert_eq!(args, vec!["-o", "a.out", "output.o"]);
    }

    #[test]
    fn test_intermediate_paths_sit_next_to_the_bitcode() {
        let bc = Path::new("/tmp/build/output.bc");
        assert_eq!(
            bc.with_file_name("output_opt.bc"),
            Path::new("/tmp/build/output_opt.bc")
        );
    }
}
