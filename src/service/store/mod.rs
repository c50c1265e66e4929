//! Content-addressed image storage.
//!
//! Images live in a blob backend under `<prefix>/<name>/<id>.<ext>`, where
//! the id is derived from the image bytes. The store is append-only: nothing
//! here deletes or rewrites an object.

pub mod key;
pub mod memory;
pub mod s3;

use std::{collections::BTreeMap, ops::Deref, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        error::{BotError, BotResult},
    },
    interaction::context::DispatchContext,
};

use key::{Filetype, ImageId, decode_key, is_valid_name, name_prefix, public_url, storage_key};

/// Object metadata attached to a stored image.
pub type Metadata = BTreeMap<String, String>;

// Traits.

/// What a conditional write found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The object was written.
    Created,
    /// An object already existed under the key and was left untouched.
    AlreadyExists,
}

/// Generic blob backend trait that storage services must implement.
///
/// Duplicate prevention belongs to the backend: `put` must be a conditional
/// create that never replaces an existing object.
#[async_trait]
pub trait GenericBlobStore: Send + Sync + 'static {
    /// Write `body` under `key` unless an object already exists there.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str, metadata: &Metadata) -> BotResult<PutOutcome>;

    /// Check whether an object exists under `key`.
    async fn exists(&self, key: &str) -> BotResult<bool>;

    /// List every key that starts with `prefix`.
    async fn list(&self, prefix: &str) -> BotResult<Vec<String>>;
}

/// Blob backend client.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct BlobClient {
    inner: Arc<dyn GenericBlobStore>,
}

impl Deref for BlobClient {
    type Target = dyn GenericBlobStore;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl BlobClient {
    pub fn new(inner: Arc<dyn GenericBlobStore>) -> Self {
        Self { inner }
    }
}

// Structs.

/// A pinned image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Img {
    id: ImageId,
    name: String,
    filetype: Filetype,
    url: String,
    metadata: Metadata,
}

impl Img {
    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filetype(&self) -> Filetype {
        self.filetype
    }

    /// The public URL of the image.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// The image store, bound to one bucket and key prefix.
#[derive(Clone)]
pub struct ImageStore {
    backend: BlobClient,
    bucket: String,
    prefix: String,
    public_domain: String,
}

impl ImageStore {
    pub fn new(config: &Config, backend: BlobClient) -> Self {
        Self::with_location(backend, &config.img_bucket, &config.img_prefix, &config.img_public_domain)
    }

    pub fn with_location(backend: BlobClient, bucket: &str, prefix: &str, public_domain: &str) -> Self {
        Self {
            backend,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            public_domain: public_domain.to_string(),
        }
    }

    /// Store an image under `name`.
    ///
    /// The id depends only on `bytes`. Adding content that is already pinned
    /// under `name` leaves the stored object alone and returns the same image.
    #[instrument(skip(self, ctx, bytes, metadata), fields(size = bytes.len()))]
    pub async fn add(&self, ctx: &DispatchContext, name: &str, filetype: Filetype, bytes: Vec<u8>, metadata: Metadata) -> BotResult<Img> {
        check_name(name)?;

        let id = ImageId::for_content(&bytes);
        let key = storage_key(&self.prefix, name, filetype, id);

        match ctx.guard(self.backend.put(&key, bytes, filetype.mime(), &metadata)).await? {
            PutOutcome::Created => info!(%key, "stored image"),
            PutOutcome::AlreadyExists => debug!(%key, "identical image already stored"),
        }

        Ok(self.img(id, name, filetype, &key, metadata))
    }

    /// Check whether this exact image is already pinned under `name`.
    #[instrument(skip(self, ctx))]
    pub async fn contains(&self, ctx: &DispatchContext, name: &str, id: ImageId, filetype: Filetype) -> BotResult<bool> {
        check_name(name)?;

        let key = storage_key(&self.prefix, name, filetype, id);
        ctx.guard(self.backend.exists(&key)).await
    }

    /// List every image pinned under `name`, ordered by id.
    ///
    /// Listing doesn't fetch object metadata, so the returned images carry none.
    #[instrument(skip(self, ctx))]
    pub async fn list(&self, ctx: &DispatchContext, name: &str) -> BotResult<Vec<Img>> {
        check_name(name)?;

        let prefix = name_prefix(&self.prefix, name);
        let keys = ctx.guard(self.backend.list(&prefix)).await?;

        let mut imgs = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(file) = key.strip_prefix(&prefix).filter(|file| !file.contains('/')) else {
                warn!(%key, "skipping key outside of the pin");
                continue;
            };

            match decode_key(file) {
                Ok((id, filetype)) => imgs.push(self.img(id, name, filetype, &key, Metadata::new())),
                Err(err) => warn!(%key, error = %err, "skipping undecodable key"),
            }
        }

        imgs.sort_by_key(Img::id);
        debug!(count = imgs.len(), "listed images");

        Ok(imgs)
    }

    fn img(&self, id: ImageId, name: &str, filetype: Filetype, key: &str, metadata: Metadata) -> Img {
        Img {
            id,
            name: name.to_string(),
            filetype,
            url: public_url(&self.bucket, &self.public_domain, key),
            metadata,
        }
    }
}

fn check_name(name: &str) -> BotResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(BotError::validation(format!("`{name}` is not a valid pin name")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockall::mock;

    use super::*;
    use memory::MemoryBlobStore;

    mock! {
        pub Blobs {}

        #[async_trait]
        impl GenericBlobStore for Blobs {
            async fn put(&self, key: &str, body: Vec<u8>, content_type: &str, metadata: &Metadata) -> BotResult<PutOutcome>;
            async fn exists(&self, key: &str) -> BotResult<bool>;
            async fn list(&self, prefix: &str) -> BotResult<Vec<String>>;
        }
    }

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n-garfield";
    const OTHER_PNG: &[u8] = b"\x89PNG\r\n\x1a\n-nermal";

    fn ctx() -> DispatchContext {
        DispatchContext::detached(Duration::from_secs(2))
    }

    fn memory_store() -> (Arc<MemoryBlobStore>, ImageStore) {
        let blobs = Arc::new(MemoryBlobStore::default());
        let store = ImageStore::with_location(BlobClient::new(blobs.clone()), "garf", "lasagna", "s3.amazonaws.com");
        (blobs, store)
    }

    fn metadata(uploader: &str) -> Metadata {
        Metadata::from([("uploaded-by".to_string(), uploader.to_string())])
    }

    #[tokio::test]
    async fn add_writes_the_blob_and_metadata() {
        let (blobs, store) = memory_store();

        let img = store.add(&ctx(), "mork", Filetype::Png, PNG.to_vec(), metadata("jon")).await.unwrap();

        let key = format!("lasagna/mork/{}.png", img.id());
        let stored = blobs.object(&key).unwrap();
        assert_eq!(stored.body, PNG);
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.metadata, metadata("jon"));

        assert_eq!(img.name(), "mork");
        assert_eq!(img.filetype(), Filetype::Png);
        assert_eq!(img.url(), format!("https://garf.s3.amazonaws.com/{key}"));
        assert_eq!(img.metadata(), &metadata("jon"));
    }

    #[tokio::test]
    async fn identical_content_gets_the_same_id() {
        let (blobs, store) = memory_store();

        let first = store.add(&ctx(), "mork", Filetype::Png, PNG.to_vec(), metadata("jon")).await.unwrap();
        let second = store.add(&ctx(), "mork", Filetype::Png, PNG.to_vec(), metadata("liz")).await.unwrap();
        let elsewhere = store.add(&ctx(), "odie", Filetype::Png, PNG.to_vec(), metadata("jon")).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(first.id(), elsewhere.id());
        assert_eq!(store.list(&ctx(), "mork").await.unwrap().len(), 1);

        // The first write wins; pins are forever.
        let key = format!("lasagna/mork/{}.png", first.id());
        assert_eq!(blobs.object(&key).unwrap().metadata, metadata("jon"));
    }

    #[tokio::test]
    async fn different_content_under_one_name_lists_both() {
        let (_, store) = memory_store();

        let a = store.add(&ctx(), "mork", Filetype::Png, PNG.to_vec(), Metadata::new()).await.unwrap();
        let b = store.add(&ctx(), "mork", Filetype::Png, OTHER_PNG.to_vec(), Metadata::new()).await.unwrap();
        store.add(&ctx(), "mork2", Filetype::Png, PNG.to_vec(), Metadata::new()).await.unwrap();

        let listed = store.list(&ctx(), "mork").await.unwrap();
        let mut expected = vec![a.id(), b.id()];
        expected.sort();

        assert_eq!(listed.iter().map(Img::id).collect::<Vec<_>>(), expected);
        assert!(listed.iter().all(|img| img.name() == "mork"));
        assert!(listed.iter().all(|img| img.url().starts_with("https://garf.s3.amazonaws.com/lasagna/mork/")));
    }

    #[tokio::test]
    async fn listing_an_unknown_name_is_empty() {
        let (_, store) = memory_store();
        assert!(store.list(&ctx(), "nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn contains_tracks_exact_content() {
        let (_, store) = memory_store();
        let img = store.add(&ctx(), "mork", Filetype::Png, PNG.to_vec(), Metadata::new()).await.unwrap();

        assert!(store.contains(&ctx(), "mork", img.id(), Filetype::Png).await.unwrap());
        assert!(!store.contains(&ctx(), "odie", img.id(), Filetype::Png).await.unwrap());
        assert!(!store.contains(&ctx(), "mork", ImageId::for_content(OTHER_PNG), Filetype::Png).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_names_that_would_escape_the_prefix() {
        let (blobs, store) = memory_store();

        let result = store.add(&ctx(), "../mork", Filetype::Png, PNG.to_vec(), Metadata::new()).await;

        assert!(matches!(result, Err(BotError::Validation(_))));
        assert!(blobs.is_empty());
        assert!(matches!(store.list(&ctx(), "a/b").await, Err(BotError::Validation(_))));
    }

    #[tokio::test]
    async fn list_skips_foreign_keys() {
        let mut blobs = MockBlobs::new();
        blobs.expect_list().returning(|prefix| {
            Ok(vec![
                format!("{prefix}7287194dfdb24cb741413ebb7f9b121d.gif"),
                format!("{prefix}README.txt"),
                format!("{prefix}nested/7287194dfdb24cb741413ebb7f9b121d.gif"),
            ])
        });
        let store = ImageStore::with_location(BlobClient::new(Arc::new(blobs)), "garf", "lasagna", "s3.amazonaws.com");

        let listed = store.list(&ctx(), "mork").await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filetype(), Filetype::Gif);
        assert_eq!(listed[0].url(), "https://garf.s3.amazonaws.com/lasagna/mork/7287194dfdb24cb741413ebb7f9b121d.gif");
    }

    #[tokio::test]
    async fn backend_failures_are_storage_errors() {
        let mut blobs = MockBlobs::new();
        blobs.expect_put().returning(|key, _, _, _| Err(BotError::storage(format!("put_object {key}"), "AccessDenied")));
        blobs.expect_list().returning(|_| Err(BotError::storage("list_objects_v2", "SlowDown")));
        let store = ImageStore::with_location(BlobClient::new(Arc::new(blobs)), "garf", "lasagna", "s3.amazonaws.com");

        let added = store.add(&ctx(), "mork", Filetype::Png, PNG.to_vec(), Metadata::new()).await;
        let listed = store.list(&ctx(), "mork").await;

        assert!(matches!(added, Err(BotError::Storage { .. })));
        assert!(matches!(listed, Err(BotError::Storage { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn an_expired_context_skips_the_backend() {
        let mut blobs = MockBlobs::new();
        blobs.expect_exists().returning(|_| Ok(true));
        let store = ImageStore::with_location(BlobClient::new(Arc::new(blobs)), "garf", "lasagna", "s3.amazonaws.com");

        let ctx = ctx();
        ctx.cancel();

        let result = store.contains(&ctx, "mork", ImageId::for_content(PNG), Filetype::Png).await;
        assert!(matches!(result, Err(BotError::Timeout)));
    }
}
