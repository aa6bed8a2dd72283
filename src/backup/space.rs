use std::path::Path;

use sysinfo::Disks;
use tracing::trace;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Answers how much room is left where backups are written
pub trait SpaceProbe: Send + Sync {
    /// Free space in MB on the filesystem holding `path`, `None` when unknown
    fn available_mb(&self, path: &Path) -> Option<f64>;
}

/// [`SpaceProbe`] reading mounted disks through `sysinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSpaceProbe;

impl SpaceProbe for DiskSpaceProbe {
    fn available_mb(&self, path: &Path) -> Option<f64> {
        // the destination may not exist yet, so canonicalize the deepest existing ancestor
        let resolved = path
            .ancestors()
            .find_map(|ancestor| ancestor.canonicalize().ok())?;

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|disk| resolved.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())?;

        let available = disk.available_space() as f64 / BYTES_PER_MB;
        trace!(
            "{} MB available on {} for {}",
            available,
            disk.mount_point().display(),
            path.display()
        );
        Some(available)
    }
}

/// Probe reporting a fixed amount of free space
#[derive(Debug, Clone, Copy)]
pub struct FixedSpaceProbe(pub f64);

impl SpaceProbe for FixedSpaceProbe {
    fn available_mb(&self, _path: &Path) -> Option<f64> {
        Some(self.0)
    }
}
