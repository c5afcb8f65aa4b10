//! FileRegenerator port - 派生ファイルの再生成
//!
//! After a successful move the caller may regenerate per-task files derived
//! from the document. The core never does this itself; the application service
//! invokes the regenerator once per affected tag, never once per moved item.

use async_trait::async_trait;

use crate::domain::StoreError;

#[async_trait]
pub trait FileRegenerator: Send + Sync {
    async fn regenerate(&self, tag: &str) -> Result<(), StoreError>;
}
