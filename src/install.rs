//! First-run installation: version gate, prompts, directory bootstrap,
//! config write, sshd_config wiring.
//!
//! Everything here runs as root at setup time, outside the login hot path,
//! so errors are plain `anyhow` failures surfaced to the operator rather
//! than coded exits.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::cache;
use crate::config::{Config, Overrides, Settings};
use crate::remote::{self, Fetcher};
use crate::sshd;

pub struct InstallOptions {
    pub url: Option<String>,
    pub token: Option<String>,
    pub public_key: Option<String>,
    pub verify: bool,
    pub no_interactive: bool,
    /// System account the agent runs as (AuthorizedKeysCommandUser); the
    /// cache directory is chowned to it.
    pub user: String,
    pub config_file: PathBuf,
    pub cache_dir: PathBuf,
    pub edit_sshd_config: bool,
    pub sshd_config_path: PathBuf,
}

pub async fn run(mut opts: InstallOptions) -> Result<()> {
    let version = sshd::installed_version().context("unable to determine sshd version")?;
    if version < sshd::OPENSSH_MIN {
        bail!(
            "OpenSSH {}.{} does not support AuthorizedKeysCommand (available since 6.2)",
            version.0,
            version.1
        );
    }

    let url = ask_once("Authority URL", opts.url.take(), opts.no_interactive)?
        .context("missing required authority URL")?;
    let token = ask_once("Authority access token", opts.token.take(), opts.no_interactive)?
        .context("missing required access token")?;
    let public_keys = if opts.verify {
        let key = ask_once(
            "Trusted public key path",
            opts.public_key.take(),
            opts.no_interactive,
        )?
        .context("--verify requires a trusted public key")?;
        vec![key]
    } else {
        Vec::new()
    };

    probe(&url, &token)
        .await
        .with_context(|| format!("check failed, unable to retrieve keys from {url}"))?;

    make_dirs(&opts)?;
    write_config(&opts.config_file, &url, &token, opts.verify, &public_keys)?;

    let directives = sshd::directives(&opts.user, version);
    if opts.edit_sshd_config {
        sshd::edit_config_file(&opts.sshd_config_path, &directives)
            .with_context(|| format!("unable to edit {}", opts.sshd_config_path.display()))?;
        eprintln!(
            "Updated {}; reload sshd to activate.",
            opts.sshd_config_path.display()
        );
    } else {
        eprintln!(
            "--sshd-config not given; add the following to {} yourself:\n",
            opts.sshd_config_path.display()
        );
        for (key, value) in &directives {
            eprintln!("{key} {value}");
        }
    }
    Ok(())
}

/// One round-trip against the authority before anything is written, so a
/// bad URL or token is caught while the operator is still watching. A bare
/// fetch, on purpose: nothing may touch the cache or the filesystem before
/// the directories exist with the right ownership.
async fn probe(url: &str, token: &str) -> Result<()> {
    let settings = Settings::resolve(
        Config {
            url: url.to_string(),
            token: token.to_string(),
            ..Config::default()
        },
        Overrides::default(),
    );
    let host = remote::local_hostname("", "")?;
    Fetcher::new(&settings)?
        .authorized_keys(&host, "test", None, None)
        .await?;
    Ok(())
}

/// Prompt once on the controlling terminal; an empty answer keeps the
/// current value. `--no-interactive` skips the prompt entirely.
fn ask_once(prompt: &str, current: Option<String>, no_interactive: bool) -> Result<Option<String>> {
    if no_interactive {
        return Ok(current);
    }
    println!("{prompt}");
    if let Some(value) = &current {
        print!("[{value}]: ");
        std::io::stdout().flush().ok();
    }
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("unable to read from stdin")?;
    let answer = line.trim();
    Ok(if answer.is_empty() {
        current
    } else {
        Some(answer.to_string())
    })
}

fn make_dirs(opts: &InstallOptions) -> Result<()> {
    if let Some(parent) = opts.config_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }
    std::fs::create_dir_all(&opts.cache_dir)
        .with_context(|| format!("unable to create {}", opts.cache_dir.display()))?;
    #[cfg(unix)]
    chown_to_user(&opts.cache_dir, &opts.user)?;
    Ok(())
}

fn write_config(
    path: &Path,
    url: &str,
    token: &str,
    verify: bool,
    public_keys: &[String],
) -> Result<()> {
    let config = Config {
        url: url.to_string(),
        token: token.to_string(),
        verify,
        public_key: public_keys.to_vec(),
        ..Config::default()
    };
    let yaml = serde_yaml::to_string(&config).context("unable to serialise config")?;
    // The config carries the bearer token: same 0600 write as the cache.
    cache::write_private_file(path, yaml.as_bytes())
        .with_context(|| format!("unable to write {}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn chown_to_user(dir: &Path, user: &str) -> Result<()> {
    let Some(uid) = lookup_uid(user) else {
        bail!("unable to find user {user}");
    };
    std::os::unix::fs::chown(dir, Some(uid), None)
        .with_context(|| format!("unable to chown {} to {user}", dir.display()))
}

#[cfg(unix)]
fn lookup_uid(name: &str) -> Option<u32> {
    let cname = std::ffi::CString::new(name).ok()?;
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0u8; 4096];
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    // SAFETY: all pointers outlive the call and getpwnam_r writes only
    // within the provided buffer.
    let ret = unsafe {
        libc::getpwnam_r(
            cname.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        )
    };
    if ret == 0 && !result.is_null() {
        Some(pwd.pw_uid)
    } else {
        None
    }
}
