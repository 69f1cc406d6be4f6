use anyhow::{Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use super::ExtractStrategy;

const SHELL_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Extra time granted to PowerShell itself beyond its own polling deadline.
const HOST_SLACK: Duration = Duration::from_secs(30);

/// Last resort: have the Windows shell open the archive as a virtual
/// folder and copy its items out, as Explorer would.
pub struct ShellCopy {
    timeout: Duration,
    poll: Duration,
}

impl Default for ShellCopy {
    fn default() -> Self {
        ShellCopy {
            timeout: SHELL_TIMEOUT,
            poll: POLL_INTERVAL,
        }
    }
}

impl ExtractStrategy for ShellCopy {
    fn name(&self) -> &str {
        "shell"
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let Some(host) = shell_host() else {
            bail!(
                "shell automation is unavailable on this host; install 7-Zip to extract {}",
                archive.display()
            );
        };
        fs::create_dir_all(dest)?;
        start_copy(&host, archive, dest, self.timeout, self.poll)?;
        wait_for_entries(dest, self.poll, self.poll)
    }
}

#[cfg(windows)]
fn shell_host() -> Option<PathBuf> {
    which::which("powershell").ok()
}

#[cfg(not(windows))]
fn shell_host() -> Option<PathBuf> {
    None
}

/// Ask `Shell.Application` to copy every archive item into `dest`.
///
/// `CopyHere` is asynchronous and belongs to the PowerShell process, so the
/// script itself polls `dest` and only exits once entries have appeared and
/// their count has held steady for one poll.
fn start_copy(
    host: &Path,
    archive: &Path,
    dest: &Path,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    use crate::process::run_with_timeout;
    use std::process::Command;

    let script = copy_script(archive, dest, timeout, poll);
    let run = run_with_timeout(
        Command::new(host).args(["-NoProfile", "-NonInteractive", "-Command", &script]),
        timeout + HOST_SLACK,
    )?;
    if !run.status.success() {
        bail!("shell extraction failed: {}", run.text());
    }
    Ok(())
}

/// Flag 20 = no progress dialog + answer "yes to all".
fn copy_script(archive: &Path, dest: &Path, timeout: Duration, poll: Duration) -> String {
    let quote = |p: &Path| p.display().to_string().replace('\'', "''");
    format!(
        "$s = New-Object -ComObject Shell.Application; \
         $src = $s.NameSpace('{archive}'); \
         if ($src -eq $null) {{ [Console]::Error.WriteLine('shell cannot open archive (no shell extension for .7z)'); exit 2 }}; \
         $s.NameSpace('{dest}').CopyHere($src.Items(), 20); \
         $deadline = (Get-Date).AddSeconds({secs}); $last = -1; \
         while ($true) {{ \
           $n = @(Get-ChildItem -LiteralPath '{dest}' -Recurse -Force -ErrorAction SilentlyContinue).Count; \
           if ($n -gt 0 -and $n -eq $last) {{ break }}; \
           if ((Get-Date) -gt $deadline) {{ if ($n -gt 0) {{ break }}; [Console]::Error.WriteLine('shell extraction timed out'); exit 3 }}; \
           $last = $n; Start-Sleep -Milliseconds {ms} \
         }}",
        archive = quote(archive),
        dest = quote(dest),
        secs = timeout.as_secs(),
        ms = poll.as_millis(),
    )
}

/// Poll `dir` until it has at least one entry or `timeout` elapses.
fn wait_for_entries(dir: &Path, timeout: Duration, poll: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if fs::read_dir(dir)?.next().is_some() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("shell extraction timed out");
        }
        thread::sleep(poll);
    }
}
