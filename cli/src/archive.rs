// Archive Fetcher
//
// Streams release assets over HTTP and unpacks them into an install
// directory. Unpacking overwrites in place, so a retry into the same
// destination is safe.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use uuid::Uuid;

use neoman_kernel::adapters::{AdapterError, ArchiveFetcher, ArchiveShape};
use neoman_kernel::config::BINARY_NAME;

pub struct HttpArchiveFetcher {
    client: Client,
}

impl HttpArchiveFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn download_and_unpack(
        &self,
        url: &str,
        destination: &Path,
        shape: ArchiveShape,
    ) -> Result<(), AdapterError> {
        tracing::info!(%url, destination = %destination.display(), "downloading");

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| AdapterError::TransferFailed(format!("failed to reach {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::TransferFailed(format!("http error {status} for {url}")));
        }

        let unpacked = match shape {
            ArchiveShape::TarGz => unpack_tar_gz(response, destination),
            ArchiveShape::Executable => {
                let name = url.rsplit('/').next().unwrap_or(BINARY_NAME);
                install_executable(response, destination, name)
            }
        };
        unpacked.map_err(|e| AdapterError::TransferFailed(format!("failed to unpack {url}: {e}")))?;

        tracing::debug!(destination = %destination.display(), "unpacked");
        Ok(())
    }
}

/// Unpack a gzipped tarball and force the executable bit on `bin/nvim`.
pub fn unpack_tar_gz<R: Read>(reader: R, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(destination)?;

    mark_binaries_executable(destination)
}

/// Write a single executable asset, staged then renamed into place.
pub fn install_executable<R: Read>(mut reader: R, destination: &Path, name: &str) -> io::Result<()> {
    fs::create_dir_all(destination)?;

    let target = destination.join(name);
    let staged = destination.join(format!(".{name}.{}.tmp", Uuid::new_v4()));

    let written = (|| -> io::Result<()> {
        let mut file = File::create(&staged)?;
        io::copy(&mut reader, &mut file)?;
        file.sync_all()?;
        set_executable(&staged)?;
        fs::rename(&staged, &target)
    })();

    if written.is_err() {
        let _ = fs::remove_file(&staged);
    }
    written
}

fn mark_binaries_executable(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            mark_binaries_executable(&path)?;
        } else if file_type.is_file() && path.ends_with(Path::new("bin").join(BINARY_NAME)) {
            set_executable(&path)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
