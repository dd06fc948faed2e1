use prism_types::{Frame, LensValue, PluginManifest};

use crate::plugin::{HostContext, LensPlugin, LifecycleContext, PluginError};

/// A lens that hands back whatever frame it last decoded.
#[derive(Debug, Clone)]
pub struct EchoLens {
    manifest: PluginManifest,
    host: Option<HostContext>,
    latest: Frame,
}

impl EchoLens {
    /// An echo lens presenting `manifest`.
    pub const fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            host: None,
            latest: Frame::empty(0),
        }
    }
}

impl LensPlugin for EchoLens {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn init(&mut self, ctx: LifecycleContext) -> Result<(), PluginError> {
        ctx.host.log("echo lens ready");
        self.host = Some(ctx.host);
        Ok(())
    }

    fn decode(&mut self, frame: &Frame) -> Result<LensValue, PluginError> {
        self.latest = frame.clone();
        let ids = frame
            .entities
            .iter()
            .map(|e| LensValue::from(e.id.as_str()))
            .collect();
        Ok(LensValue::map([("entities", LensValue::Array(ids))]))
    }

    fn update(&mut self, _decoded: &LensValue, _dt: f64) -> Result<(), PluginError> {
        Ok(())
    }

    fn render(&mut self) -> Result<Option<LensValue>, PluginError> {
        Ok(Some(LensValue::map([("status", LensValue::from("ok"))])))
    }

    fn encode(&mut self) -> Result<Frame, PluginError> {
        Ok(self.latest.clone())
    }

    fn shutdown(&mut self) -> Result<(), PluginError> {
        if let Some(host) = self.host.take() {
            host.log("echo lens stopped");
        }
        Ok(())
    }
}
