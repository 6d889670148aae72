use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::TransferConfig;
use crate::credentials::CredentialSource;
use crate::store::ObjectStore;

pub fn transfer_config() -> TransferConfig {
    TransferConfig {
        bucket: "bucket".to_string(),
        region: "ap-northeast-1".to_string(),
        credentials: CredentialSource::Profile("test".to_string()),
        max_rate: throttle::DEFAULT_RATE,
        burst: throttle::DEFAULT_BURST,
    }
}

pub async fn setup_test_dir() -> anyhow::Result<tempfile::TempDir> {
    // create a temporary directory
    let tmp_dir = tempfile::tempdir()?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- 3.txt
    // |- baz
    //    |- 4.txt
    //    |- 5.txt -> ../bar/2.txt
    //    |- 6.txt -> (absolute path) .../foo/bar/3.txt
    //    |- empty
    let foo_path = tmp_dir.path().join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    tokio::fs::write(foo_path.join("0.txt"), "0").await?;
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("2.txt"), "2").await?;
    tokio::fs::write(bar_path.join("3.txt"), "3").await?;
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("4.txt"), "4").await?;
    tokio::fs::symlink("../bar/2.txt", baz_path.join("5.txt")).await?;
    tokio::fs::symlink(bar_path.join("3.txt"), baz_path.join("6.txt")).await?;
    tokio::fs::create_dir(baz_path.join("empty")).await?;
    Ok(tmp_dir)
}

/// In-memory [`ObjectStore`] recording every attempted key, optionally failing on keys that
/// end with a given suffix.
#[derive(Default)]
pub struct MemoryStore {
    objects: std::sync::Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
    attempts: std::sync::Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(suffix: &str) -> Self {
        Self {
            fail_on: Some(suffix.to_string()),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> anyhow::Result<u64> {
        self.attempts.lock().unwrap().push(key.to_string());
        if self
            .fail_on
            .as_deref()
            .is_some_and(|suffix| key.ends_with(suffix))
        {
            anyhow::bail!("injected failure putting {bucket}/{key}");
        }
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let size = data.len() as u64;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(size)
    }
}
