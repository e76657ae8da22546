//! Interactive shell over one session.
//!
//! Reads one command per line. Recoverable errors are printed and the loop
//! continues; a fatal error ends the loop and is returned so the caller can
//! abandon the session. `quit`, `exit`, `q!` and end of input end the loop
//! normally.

use crate::error::ApiError;
use crate::session::{ExtensionFilter, ImportMode, VirtualFileSystem};
use std::io::{BufRead, Write};
use std::path::Path;

const HELP: &str = "\
commands:
  pwd                              print the current directory
  cd [path]                        change directory (default /)
  ls [path]                        list a directory
  mkdir [-p] <path>                create a directory
  cp <src> <dst>                   copy a file or directory
  mv <src> <dst>                   move or rename
  rm [-r] <path>                   remove a file or directory
  cat <path>                       print a file
  stat <path>                      show node details
  import [--move] [--ext a,b] <host> <path>
  export [--ext a,b] <path> <host>
  diff <base> <patch>              compare two directories
  help                             show this text
  quit                             commit and leave";

/// Run the shell until quit or end of input.
pub fn run_shell<R: BufRead, W: Write>(
    vfs: &mut VirtualFileSystem,
    input: R,
    output: &mut W,
) -> Result<(), ApiError> {
    let mut lines = input.lines();
    loop {
        write!(output, "{}:{}$ ", vfs.user(), vfs.current_dir()?)?;
        output.flush()?;
        let Some(line) = lines.next() else {
            writeln!(output)?;
            break;
        };
        let line = line?;
        let words = match tokenize(&line) {
            Ok(words) => words,
            Err(msg) => {
                writeln!(output, "error: {}", msg)?;
                continue;
            }
        };
        let Some((command, args)) = words.split_first() else {
            continue;
        };
        if matches!(command.as_str(), "quit" | "exit" | "q!") {
            break;
        }
        match run_command(vfs, command, args, output) {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                writeln!(output, "fatal: {}", err)?;
                return Err(err);
            }
            Err(err) => writeln!(output, "error: {}", err)?,
        }
    }
    Ok(())
}

fn run_command<W: Write>(
    vfs: &mut VirtualFileSystem,
    command: &str,
    args: &[String],
    out: &mut W,
) -> Result<(), ApiError> {
    let Args {
        flags,
        ext,
        positional,
    } = split_args(args);
    let has = |flag: &str| flags.iter().any(|f| *f == flag);

    match (command, positional.as_slice()) {
        ("help", _) => writeln!(out, "{}", HELP)?,
        ("pwd", []) => writeln!(out, "{}", vfs.current_dir()?)?,
        ("cd", []) => vfs.change_dir("/")?,
        ("cd", [path]) => vfs.change_dir(path)?,
        ("ls", rest) if rest.len() <= 1 => {
            for entry in vfs.list(rest.first().copied().unwrap_or(""))? {
                match entry.kind {
                    crate::types::NodeKind::Directory => writeln!(out, "{}/", entry.name)?,
                    crate::types::NodeKind::File => {
                        writeln!(out, "{}\t{}", entry.name, entry.size)?
                    }
                }
            }
        }
        ("mkdir", [path]) => vfs.make_dir(path, has("-p"))?,
        ("cp", [src, dst]) => {
            vfs.copy(src, dst)?;
        }
        ("mv", [src, dst]) => vfs.move_node(src, dst)?,
        ("rm", [path]) => {
            let outcome = vfs.remove(path, has("-r"))?;
            writeln!(
                out,
                "removed {} file(s), reclaimed {} entit{}",
                outcome.files,
                outcome.reclaimed,
                if outcome.reclaimed == 1 { "y" } else { "ies" }
            )?;
            if outcome.orphaned > 0 {
                writeln!(out, "{} entities left as orphans", outcome.orphaned)?;
            }
        }
        ("cat", [path]) => {
            vfs.read_to_writer(path, out)?;
            writeln!(out)?;
        }
        ("stat", [path]) => {
            let info = vfs.stat(path)?;
            writeln!(out, "path: {}", info.path)?;
            writeln!(out, "kind: {}", info.kind)?;
            writeln!(out, "size: {}", info.size)?;
            if let Some(digest) = info.digest {
                writeln!(out, "digest: {}", digest)?;
            }
            writeln!(out, "modified: {}", info.metadata.modified.to_rfc3339())?;
        }
        ("import", [host, inner]) => {
            let mode = if has("--move") {
                ImportMode::Move
            } else {
                ImportMode::Copy
            };
            let summary = vfs.import_host(Path::new(host), inner, mode, &filter(ext))?;
            writeln!(
                out,
                "imported {} file(s), {} skipped",
                summary.files, summary.skipped
            )?;
        }
        ("export", [inner, host]) => {
            let summary = vfs.export_host(inner, Path::new(host), &filter(ext))?;
            writeln!(
                out,
                "exported {} file(s), {} skipped",
                summary.files, summary.skipped
            )?;
        }
        ("diff", [base, patch]) => {
            for line in vfs.diff(base, patch)? {
                writeln!(out, "{}", line)?;
            }
        }
        _ => writeln!(out, "unknown or malformed command {:?}; try `help`", command)?,
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct Args<'a> {
    flags: Vec<&'a str>,
    ext: Option<&'a str>,
    positional: Vec<&'a str>,
}

/// Separate `-x` flags from operands. The word after `--ext` is its value,
/// never an operand, even when an operand has the same text.
fn split_args(args: &[String]) -> Args<'_> {
    let ext_at = args.iter().position(|a| a == "--ext").map(|i| i + 1);
    let mut parsed = Args {
        ext: ext_at.and_then(|i| args.get(i)).map(String::as_str),
        ..Args::default()
    };
    for (i, arg) in args.iter().enumerate() {
        if Some(i) == ext_at {
            continue;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            parsed.flags.push(arg);
        } else {
            parsed.positional.push(arg);
        }
    }
    parsed
}

fn filter(ext: Option<&str>) -> ExtensionFilter {
    ext.map(ExtensionFilter::parse).unwrap_or_default()
}

/// Split on whitespace, keeping double-quoted runs together.
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quoted {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
