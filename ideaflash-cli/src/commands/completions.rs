//! Shell completion generation and installation.

use {
    crate::Cli,
    anyhow::{Context, Result},
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    console::style,
    std::{
        env, fs,
        io::{self, Write as _},
        path::{Path, PathBuf},
    },
};

const BIN: &str = "ideaflash";

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, BIN, out);
}

/// Detect the user's current shell from environment.
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

/// Map a shell binary path to its `Shell`.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    match Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())?
    {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

fn home_dir() -> Result<PathBuf> {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .context("Could not determine home directory")
}

/// `$XDG_<var>` or `~/<fallback>`.
fn xdg_dir(var: &str, fallback: &[&str]) -> Result<PathBuf> {
    match env::var(var) {
        Ok(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => Ok(fallback
            .iter()
            .fold(home_dir()?, |path, part| path.join(part))),
    }
}

/// Where the completion script for `shell` is installed.
fn completion_install_path(shell: Shell) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => xdg_dir("XDG_DATA_HOME", &[".local", "share"])?
            .join("bash-completion")
            .join("completions")
            .join(BIN),
        Shell::Zsh => home_dir()?
            .join(".zfunc")
            .join(format!("_{BIN}")),
        Shell::Fish => xdg_dir("XDG_CONFIG_HOME", &[".config"])?
            .join("fish")
            .join("completions")
            .join(format!("{BIN}.fish")),
        Shell::Elvish => xdg_dir("XDG_CONFIG_HOME", &[".config"])?
            .join("elvish")
            .join("lib")
            .join(format!("{BIN}.elv")),
        Shell::PowerShell => {
            let dir = match env::var("PROFILE") {
                Ok(profile) => PathBuf::from(profile)
                    .parent()
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
                Err(_) => home_dir()?
                    .join(".config")
                    .join("powershell")
                    .join("completions"),
            };
            dir.join(format!("{BIN}.ps1"))
        },
        _ => anyhow::bail!("Unsupported shell for auto-install"),
    };
    Ok(path)
}

/// Make sure `~/.zfunc` is on zsh's fpath.
fn ensure_zsh_fpath() -> Result<()> {
    let zshrc = home_dir()?.join(".zshrc");
    let fpath_line = "fpath=(~/.zfunc $fpath)";
    if fs::read_to_string(&zshrc).is_ok_and(|content| content.contains(fpath_line)) {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&zshrc)
        .with_context(|| format!("Failed to update {}", zshrc.display()))?;
    writeln!(file, "\n# {BIN} completions")?;
    writeln!(file, "{fpath_line}")?;
    writeln!(file, "autoload -Uz compinit && compinit")?;
    eprintln!(
        "{} Added fpath to {}",
        style("✓")
            .green()
            .bold(),
        style(zshrc.display()).yellow()
    );
    Ok(())
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(s) => s,
        None => detect_shell_type().context(
            "Could not detect your shell. Please specify it explicitly:\n  \
             ideaflash completions --install bash",
        )?,
    };
    let path = completion_install_path(shell)?;

    let mut script = Vec::new();
    write_completions(shell, &mut script);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &script)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓")
            .green()
            .bold(),
        style(format!("{shell:?}")).cyan(),
        style(path.display()).yellow()
    );

    eprintln!();
    match shell {
        Shell::Bash => eprintln!(
            "To activate now: {}",
            style(format!("source {}", path.display())).cyan()
        ),
        Shell::Zsh => {
            ensure_zsh_fpath()?;
            eprintln!("Restart your shell or run: {}", style("exec zsh").cyan());
        },
        Shell::PowerShell => eprintln!(
            "Add to your PowerShell profile: {}",
            style(format!("Import-Module {}", path.display())).cyan()
        ),
        _ => eprintln!("Completions will be loaded in new shell sessions."),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_from_path() {
        assert_eq!(shell_from_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(shell_from_path("/usr/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(shell_from_path("/usr/local/bin/fish"), Some(Shell::Fish));
        assert_eq!(shell_from_path("elvish"), Some(Shell::Elvish));
        assert_eq!(shell_from_path("/usr/bin/pwsh"), Some(Shell::PowerShell));
        assert_eq!(shell_from_path("/usr/bin/tcsh"), None);
        assert_eq!(shell_from_path(""), None);
    }

    #[test]
    fn test_install_paths_end_with_binary_name() {
        if home_dir().is_err() {
            return;
        }
        let cases = [
            (Shell::Bash, "ideaflash"),
            (Shell::Zsh, "_ideaflash"),
            (Shell::Fish, "ideaflash.fish"),
            (Shell::Elvish, "ideaflash.elv"),
            (Shell::PowerShell, "ideaflash.ps1"),
        ];
        for (shell, file) in cases {
            let path = completion_install_path(shell).unwrap();
            assert_eq!(
                path.file_name().and_then(|n| n.to_str()),
                Some(file),
                "{shell:?}"
            );
        }
    }

    #[test]
    fn test_completion_scripts_mention_binary() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let mut buf = Vec::new();
            write_completions(shell, &mut buf);
            let script = String::from_utf8(buf).unwrap();
            assert!(script.contains(BIN), "{shell:?}");
            assert!(script.contains("list-ports"), "{shell:?}");
        }
    }
}
