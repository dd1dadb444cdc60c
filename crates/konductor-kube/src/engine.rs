//! Provisioning engine abstraction and the metadata middleware
//!
//! Module code never talks to an engine directly. It goes through a
//! [`Provisioner`], which runs the registered [`ResourceTransform`]s over every
//! resource before submitting it, and hands the same transforms to the engine
//! so objects the engine expands (chart output, manifest documents) are
//! transformed too.

use async_trait::async_trait;
use konductor_core::{GlobalMetadataStore, ResourceMetadata};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::handle::ResourceHandle;
use crate::resource::{CustomTimeouts, Resource};

/// Options for a single apply
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Resources that must be in place before this one
    pub depends_on: Vec<ResourceHandle>,
    /// Engine timeouts, passed through untouched
    pub timeouts: CustomTimeouts,
}

impl ApplyOptions {
    pub fn depends_on(handles: impl IntoIterator<Item = ResourceHandle>) -> Self {
        Self {
            depends_on: handles.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_timeouts(mut self, timeouts: CustomTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// A mutation applied to the metadata of every provisioned object
pub trait ResourceTransform: Send + Sync {
    fn transform(&self, metadata: &mut ResourceMetadata);
}

/// Fills gaps in a resource's labels/annotations from the run's global metadata
///
/// Reads through the shared store, so a transform installed before the store
/// is initialized picks the metadata up once it is.
pub struct MetadataTransform {
    store: Arc<GlobalMetadataStore>,
}

impl MetadataTransform {
    pub fn new(store: Arc<GlobalMetadataStore>) -> Self {
        Self { store }
    }
}

impl ResourceTransform for MetadataTransform {
    fn transform(&self, metadata: &mut ResourceMetadata) {
        self.store.apply_in_place(metadata);
    }
}

/// Fills gaps in a derived object's labels/annotations from its parent resource
pub struct InheritMetadata {
    parent: ResourceMetadata,
}

impl InheritMetadata {
    pub fn new(parent: ResourceMetadata) -> Self {
        Self { parent }
    }
}

impl ResourceTransform for InheritMetadata {
    fn transform(&self, metadata: &mut ResourceMetadata) {
        for (key, value) in &self.parent.labels {
            metadata.labels.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (key, value) in &self.parent.annotations {
            metadata
                .annotations
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Ordered list of transforms
#[derive(Clone, Default)]
pub struct TransformChain {
    transforms: Vec<Arc<dyn ResourceTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Arc<dyn ResourceTransform>) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Run every transform in registration order
    pub fn apply(&self, metadata: &mut ResourceMetadata) {
        for transform in &self.transforms {
            transform.transform(metadata);
        }
    }

    /// Chain for objects derived from `parent` (chart output, manifest documents)
    ///
    /// The parent's own labels and annotations fill gaps first, then this
    /// chain runs. A key the child already sets keeps the child's value.
    pub fn for_children(&self, parent: &ResourceMetadata) -> TransformChain {
        if parent.labels.is_empty() && parent.annotations.is_empty() {
            return self.clone();
        }
        let mut chain = TransformChain::new();
        chain.push(Arc::new(InheritMetadata::new(parent.clone())));
        chain.transforms.extend(self.transforms.iter().cloned());
        chain
    }
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformChain")
            .field("len", &self.transforms.len())
            .finish()
    }
}

/// Provisioning engine
///
/// Implementations must be Send + Sync; one engine is shared by every module
/// of a run.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Create or update a resource
    ///
    /// `transforms` must be applied to every object the engine derives from
    /// `resource` (the top-level metadata has already been transformed), and
    /// derived objects inherit `resource.metadata` as well; see
    /// [`TransformChain::for_children`].
    async fn apply(
        &self,
        resource: Resource,
        options: &ApplyOptions,
        transforms: &TransformChain,
    ) -> Result<ResourceHandle>;
}

/// The adapter every resource-construction call goes through
#[derive(Clone)]
pub struct Provisioner {
    engine: Arc<dyn ProvisioningEngine>,
    transforms: TransformChain,
}

impl Provisioner {
    pub fn new(engine: Arc<dyn ProvisioningEngine>) -> Self {
        Self {
            engine,
            transforms: TransformChain::new(),
        }
    }

    /// Register a transform; applies to every later `apply`
    pub fn with_transform(mut self, transform: Arc<dyn ResourceTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Register the run's shared metadata store as a transform
    pub fn with_metadata_store(self, store: Arc<GlobalMetadataStore>) -> Self {
        self.with_transform(Arc::new(MetadataTransform::new(store)))
    }

    pub fn transforms(&self) -> &TransformChain {
        &self.transforms
    }

    /// Transform and submit a resource
    pub async fn apply(
        &self,
        mut resource: Resource,
        options: ApplyOptions,
    ) -> Result<ResourceHandle> {
        self.transforms.apply(&mut resource.metadata);
        debug!(
            resource = %resource.id(),
            depends_on = options.depends_on.len(),
            "submitting resource"
        );
        self.engine.apply(resource, &options, &self.transforms).await
    }
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("transforms", &self.transforms)
            .finish_non_exhaustive()
    }
}
