use prism_types::{Frame, LensValue, PluginManifest, Vec2};

use crate::plugin::{HostContext, LensPlugin, LifecycleContext, PluginError};

/// A lens that shifts every entity by the same random whole step in
/// `{0, 1, 2}` on both axes, drawn from the host's seeded stream.
#[derive(Debug, Clone)]
pub struct JitterLens {
    manifest: PluginManifest,
    host: Option<HostContext>,
    pending: Frame,
}

impl JitterLens {
    /// A jitter lens presenting `manifest`.
    pub const fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            host: None,
            pending: Frame::empty(0),
        }
    }
}

impl LensPlugin for JitterLens {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn init(&mut self, ctx: LifecycleContext) -> Result<(), PluginError> {
        self.host = Some(ctx.host);
        Ok(())
    }

    fn decode(&mut self, frame: &Frame) -> Result<LensValue, PluginError> {
        self.pending = frame.clone();
        Ok(LensValue::Null)
    }

    fn update(&mut self, _decoded: &LensValue, _dt: f64) -> Result<(), PluginError> {
        let host = self
            .host
            .as_mut()
            .ok_or_else(|| PluginError::new("jitter lens used before init"))?;
        let step = (host.random() * 3.0).floor();
        let delta = Vec2::new(step, step);
        for entity in &mut self.pending.entities {
            entity.position = entity.position.offset(delta);
        }
        Ok(())
    }

    fn encode(&mut self) -> Result<Frame, PluginError> {
        Ok(self.pending.clone())
    }

    fn shutdown(&mut self) -> Result<(), PluginError> {
        self.host = None;
        Ok(())
    }
}
