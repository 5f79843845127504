//! The narrow contract over the OCI unikernel packager.

use std::path::Path;

use async_trait::async_trait;
use ukfaas_types::ImageTarget;

use crate::Result;

/// Where a catalogue query looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogueScope {
    /// The local image store only.
    Local,
    /// Configured remote registries.
    Remote,
}

/// One package the catalogue matched for a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHandle {
    /// Fully-qualified image reference.
    pub reference: String,

    /// Whether the package content is already present locally.
    pub pulled: bool,
}

/// OCI-packaged unikernel store, consumed through a narrow interface.
///
/// The packager's internals (registry auth, content store layout) live
/// behind this trait; the machine service only queries, pulls and unpacks.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Application packages matching the reference in the given scope.
    async fn catalogue(&self, reference: &str, scope: CatalogueScope)
    -> Result<Vec<PackageHandle>>;

    /// Fetches the package content into the local store.
    async fn pull(&self, package: &PackageHandle) -> Result<()>;

    /// Unpacks the package into `dest` and describes the boot target.
    async fn unpack(&self, package: &PackageHandle, dest: &Path) -> Result<ImageTarget>;
}
