// Password file management utility, replacing the teacher's stubbed-out
// `hebo-passwd`. Reads the whole file into memory, edits one entry, and
// rewrites it; password files are small enough that this is simpler than
// streaming edits in place.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use mossmq_broker::auth::passwd::Passwd;

#[derive(Parser, Debug)]
#[command(name = "mossmq-passwd", about = "manage mossmq password files")]
struct Cli {
    /// Password file to edit; created if it doesn't exist.
    file: PathBuf,

    /// Username to add, update, or (with --delete) remove.
    username: String,

    /// Plaintext password. Omit with --delete.
    password: Option<String>,

    /// Remove `username` from the file instead of setting its password.
    #[arg(short, long)]
    delete: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut entries = match load_entries(&cli.file) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("failed to read {}: {err}", cli.file.display());
            return ExitCode::FAILURE;
        }
    };

    if cli.delete {
        entries.retain(|(username, _)| username != &cli.username);
    } else {
        let Some(password) = &cli.password else {
            eprintln!("a password is required unless --delete is given");
            return ExitCode::FAILURE;
        };
        let passwd = Passwd::generate(password.as_bytes());
        entries.retain(|(username, _)| username != &cli.username);
        entries.push((cli.username.clone(), passwd));
    }

    if let Err(err) = write_entries(&cli.file, &entries) {
        eprintln!("failed to write {}: {err}", cli.file.display());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn load_entries(path: &PathBuf) -> std::io::Result<Vec<(String, Passwd)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in contents.lines() {
        if let Ok(Some(entry)) = Passwd::parse_line(line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn write_entries(path: &PathBuf, entries: &[(String, Passwd)]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    for (username, passwd) in entries {
        writeln!(file, "{}", passwd.dump(username))?;
    }
    Ok(())
}
