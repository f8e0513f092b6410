//! # Label Writer
//!
//! The whole pipeline behind one call:
//!
//! ```text
//! ServiceCall ─► lookup ─► fetch images ─► compose ─► encode ─► segment ─► lease ─► transfer
//! ```
//!
//! [`LabelWriter::preview`] stops after compose and returns a PNG.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::device::{Catalog, DeviceProfile};
use crate::error::{EtiquetaError, TransferFailure};
use crate::payload::ServiceCall;
use crate::protocol::{self, Chunk, EncodedFrame};
use crate::render::{Composer, Composition, FontBook, IconFont, ImageLoader, RenderWarning};
use crate::transfer::{
    BusyPolicy, LinkAdapter, SessionRegistry, TransferConfig, TransferDriver, TransferReport,
};

/// Which label to write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    pub address: String,
    pub model_id: u8,
}

impl WriteTarget {
    pub fn new(address: impl Into<String>, model_id: u8) -> Self {
        Self {
            address: address.into(),
            model_id,
        }
    }
}

/// A transfer report plus anything skipped while rendering.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReport {
    #[serde(flatten)]
    pub transfer: TransferReport,
    pub warnings: Vec<RenderWarning>,
}

/// A rendered frame ready to send.
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub profile: DeviceProfile,
    pub composition: Composition,
    pub frame: EncodedFrame,
    pub chunks: Vec<Chunk>,
}

pub struct LabelWriter {
    catalog: Catalog,
    composer: Composer,
    loader: ImageLoader,
    driver: TransferDriver,
    registry: SessionRegistry,
    link: Arc<dyn LinkAdapter>,
}

impl LabelWriter {
    /// Writer with the built-in catalog, default limits and no font assets.
    pub fn new(link: Arc<dyn LinkAdapter>) -> Self {
        Self {
            catalog: Catalog::builtin(),
            composer: Composer::new(),
            loader: ImageLoader::default(),
            driver: TransferDriver::default(),
            registry: SessionRegistry::new(BusyPolicy::default()),
            link,
        }
    }

    /// Writer configured from an [`AppConfig`]. Fonts and icons are loaded
    /// here; a configured asset that fails to load is an error.
    pub fn from_config(config: &AppConfig, link: Arc<dyn LinkAdapter>) -> Result<Self, EtiquetaError> {
        let mut composer = Composer::new();
        if let Some(dir) = config.fonts_dir() {
            composer = composer.with_fonts(FontBook::load_dir(&dir)?);
        }
        if let Some((font, meta)) = config.icon_paths() {
            composer = composer.with_icons(IconFont::load(&font, &meta)?);
        }

        Ok(Self::new(link)
            .with_composer(composer)
            .with_loader(ImageLoader::new(config.fetch_timeout())?)
            .with_transfer_config(config.to_transfer_config())
            .with_busy_policy(config.transfer.busy_policy))
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_loader(mut self, loader: ImageLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.driver = TransferDriver::new(config);
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.registry = SessionRegistry::new(policy);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Resolve images and compose the call for a model.
    pub async fn render(&self, model_id: u8, call: ServiceCall) -> Result<Composition, EtiquetaError> {
        let profile = self.catalog.lookup(model_id)?.clone();
        let mut request = call.into_request(profile);
        self.loader.resolve(&mut request.elements).await;
        Ok(self.composer.compose(&request))
    }

    /// Render to PNG without touching the link.
    pub async fn preview(&self, model_id: u8, call: ServiceCall) -> Result<Vec<u8>, EtiquetaError> {
        self.render(model_id, call).await?.canvas.to_png()
    }

    /// Render, encode and segment.
    pub async fn prepare(&self, model_id: u8, call: ServiceCall) -> Result<PreparedFrame, EtiquetaError> {
        let composition = self.render(model_id, call).await?;
        let profile = self.catalog.lookup(model_id)?.clone();
        let frame = protocol::encode(&composition.canvas, &profile)?;
        let chunks = protocol::segment(&frame, profile.chunk_size)?;
        tracing::debug!(
            model = profile.name,
            frame_bytes = frame.len(),
            chunks = chunks.len(),
            "frame prepared"
        );
        Ok(PreparedFrame {
            profile,
            composition,
            frame,
            chunks,
        })
    }

    /// Render the call and push it to the label.
    ///
    /// `cancel` is honored while images download, while queued behind another
    /// transfer to the same label, and during the transfer itself.
    pub async fn write(
        &self,
        target: &WriteTarget,
        call: ServiceCall,
        cancel: &CancellationToken,
    ) -> Result<WriteReport, EtiquetaError> {
        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferFailure::Cancelled.into()),
            prepared = self.prepare(target.model_id, call) => prepared?,
        };
        let lease = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(address = %target.address, "write cancelled before transfer");
                return Err(TransferFailure::Cancelled.into());
            }
            lease = self.registry.acquire(&target.address) => lease?,
        };

        let transfer = self
            .driver
            .run(
                self.link.as_ref(),
                &target.address,
                &prepared.profile,
                prepared.chunks,
                cancel,
                Some(lease.observer()),
            )
            .await?;

        Ok(WriteReport {
            transfer,
            warnings: prepared.composition.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceProfile;
    use crate::payload::{Color, PayloadElement, Text};
    use crate::transfer::{SimulatedLabel, SimulatedNetwork, TransferState};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const ADDR: &str = "11:22:33:44:55:66";

    fn call() -> ServiceCall {
        ServiceCall {
            rotate: Default::default(),
            background: Color::White,
            payload: vec![PayloadElement::Text(Text::new("Hi", 4, 4, 24))],
        }
    }

    fn network(profile: DeviceProfile) -> (SimulatedNetwork, SimulatedLabel) {
        let label = SimulatedLabel::new(profile);
        let mut net = SimulatedNetwork::new();
        net.add(ADDR, label.clone());
        (net, label)
    }

    #[tokio::test]
    async fn test_write_displays_rendered_frame() {
        let (net, label) = network(DeviceProfile::EPD_29_BWR);
        let writer = LabelWriter::new(Arc::new(net));

        let expected = writer.prepare(0x32, call()).await.unwrap();
        let report = writer
            .write(&WriteTarget::new(ADDR, 0x32), call(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.transfer.chunks, 40);
        assert!(report.warnings.is_empty());
        assert_eq!(label.displayed_frame(), Some(expected.frame.bytes().to_vec()));
        assert_eq!(
            label.displayed_canvas().unwrap().unwrap(),
            expected.composition.canvas
        );
        assert_eq!(writer.registry().state(ADDR), Some(TransferState::Completed));
        assert!(!writer.registry().is_busy(ADDR));
    }

    #[tokio::test]
    async fn test_unknown_model_never_connects() {
        let (net, label) = network(DeviceProfile::EPD_29_BW);
        let writer = LabelWriter::new(Arc::new(net));
        let err = writer
            .write(&WriteTarget::new(ADDR, 0x77), call(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EtiquetaError::UnknownModel(0x77)));
        assert_eq!(label.connects(), 0);
    }

    #[tokio::test]
    async fn test_transfer_failure_propagates() {
        let net = SimulatedNetwork::new();
        let writer = LabelWriter::new(Arc::new(net));
        let err = writer
            .write(&WriteTarget::new(ADDR, 0x28), call(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EtiquetaError::Transfer(TransferFailure::ConnectError(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_while_queued() {
        let (net, label) = network(DeviceProfile::EPD_29_BW);
        let writer = LabelWriter::new(Arc::new(net)).with_busy_policy(BusyPolicy::Queue);
        let _held = writer.registry().acquire(ADDR).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            writer.write(&WriteTarget::new(ADDR, 0x28), call(), &cancel),
        )
        .await
        .expect("write stayed parked behind the held lease")
        .unwrap_err();

        assert!(matches!(err, EtiquetaError::Transfer(TransferFailure::Cancelled)));
        assert_eq!(label.connects(), 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_queued_waiter() {
        let (net, label) = network(DeviceProfile::EPD_29_BW);
        let writer = LabelWriter::new(Arc::new(net)).with_busy_policy(BusyPolicy::Queue);
        let held = writer.registry().acquire(ADDR).await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = writer
            .write(&WriteTarget::new(ADDR, 0x28), call(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EtiquetaError::Transfer(TransferFailure::Cancelled)));
        drop(held);

        // the lease is free again for the next writer
        assert!(!writer.registry().is_busy(ADDR));
        writer
            .write(&WriteTarget::new(ADDR, 0x28), call(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(label.connects(), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_image_download() {
        // accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/logo.png", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let (net, label) = network(DeviceProfile::EPD_29_BW);
        let writer = LabelWriter::new(Arc::new(net))
            .with_loader(ImageLoader::new(Duration::from_secs(30)).unwrap());
        let mut call = call();
        call.payload
            .push(PayloadElement::Image(crate::payload::Image::new(url, 0, 0)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            writer.write(&WriteTarget::new(ADDR, 0x28), call, &cancel),
        )
        .await
        .expect("download ignored cancellation")
        .unwrap_err();
        assert!(matches!(err, EtiquetaError::Transfer(TransferFailure::Cancelled)));
        assert_eq!(label.connects(), 0);
    }

    #[tokio::test]
    async fn test_preview_is_png() {
        let writer = LabelWriter::new(Arc::new(SimulatedNetwork::new()));
        let png = writer.preview(0x28, call()).await.unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn test_missing_image_is_a_warning() {
        let writer = LabelWriter::new(Arc::new(SimulatedNetwork::new()));
        let mut call = call();
        call.payload.push(PayloadElement::Image(crate::payload::Image::new(
            "/nonexistent/logo.png",
            0,
            0,
        )));
        let composition = writer.render(0x28, call).await.unwrap();
        assert_eq!(composition.warnings.len(), 1);
    }
}
