//! Session context
//!
//! Owns one locator, one type table resolver and one camera resolver and drives
//! them through the session lifecycle: [`SessionContext::start`] on the host's
//! session-start signal, [`SessionContext::tick`] every frame, and
//! [`SessionContext::end`] on session end, after which the context is
//! indistinguishable from a fresh one.

use crate::camera::{AimState, CameraList, CameraResolver};
use crate::config::SessionConfig;
use crate::locator::{GraphLocator, ListBounds, LocateResult};
use crate::metadata::{TypeTable, TypeTableResolver};
use crate::platform::MemoryReader;
use crate::projection::{Projector, Viewport};
use crate::utils::CancellationToken;
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Where to start looking, as supplied by the host at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRoots {
    /// Sentinels of the node list
    pub graph: ListBounds,
    /// Enables the type table route as fallback and cross-check
    pub type_table: Option<TypeTable>,
    /// Camera pointer array
    pub cameras: CameraList,
}

/// Per-session state
#[derive(Debug)]
pub struct SessionContext {
    config: SessionConfig,
    locator: GraphLocator,
    types: TypeTableResolver,
    camera: CameraResolver,
    root: Option<LocateResult>,
}

impl SessionContext {
    /// Context with no session started
    pub fn new(config: SessionConfig) -> Self {
        Self {
            locator: GraphLocator::new(config.locator.clone()),
            types: TypeTableResolver::new(config.type_table.clone()),
            camera: CameraResolver::new(config.camera.clone()),
            root: None,
            config,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Session root, once started
    pub fn root(&self) -> Option<&LocateResult> {
        self.root.as_ref()
    }

    /// A session root has been found and the camera session is running
    pub fn is_started(&self) -> bool {
        self.root.is_some()
    }

    /// Camera resolver of this session
    pub fn camera(&self) -> &CameraResolver {
        &self.camera
    }

    /// For the host's aim-state hooks (e.g. [`CameraResolver::rearm_optic_search`])
    pub fn camera_mut(&mut self) -> &mut CameraResolver {
        &mut self.camera
    }

    /// A projector bound to this session's live view
    pub fn projector(&self, viewport: Viewport) -> Projector {
        Projector::new(self.camera.view(), viewport, self.config.projection.clone())
    }

    /// Find the session root and start the camera session
    ///
    /// The node list walk is tried first; if it fails and a type table was
    /// supplied, the static field route is tried instead. When both routes
    /// succeed and disagree the walk wins. Cancellation never falls back.
    ///
    /// On error the context is left as if never started.
    pub fn start<R: MemoryReader>(
        &mut self,
        reader: &R,
        cancel: &CancellationToken,
        roots: SessionRoots,
    ) -> Result<&LocateResult> {
        self.end();

        let root = match self.locate_root(reader, cancel, roots) {
            Ok(root) => root,
            Err(e) => {
                self.end();
                return Err(e);
            }
        };

        if let Err(e) = self.camera.start_session(reader, roots.cameras) {
            warn!(error = %e, "camera session failed to start");
            self.end();
            return Err(e);
        }

        info!(
            root = format_args!("0x{:X}", root.root_address),
            label = %root.session_label,
            "session started"
        );

        Ok(self.root.insert(root))
    }

    /// Refresh the live view; see [`CameraResolver::tick`]
    pub fn tick<R: MemoryReader>(&mut self, reader: &R, aim: AimState) -> Result<()> {
        if !self.is_started() {
            return Err(Error::SessionNotStarted);
        }
        self.camera.tick(reader, aim)
    }

    /// Drop every piece of session state
    pub fn end(&mut self) {
        if self.root.take().is_some() {
            debug!("session ended");
        }
        self.locator.reset();
        self.camera.reset();
    }

    fn locate_root<R: MemoryReader>(
        &self,
        reader: &R,
        cancel: &CancellationToken,
        roots: SessionRoots,
    ) -> Result<LocateResult> {
        let graph = self.locator.locate(reader, roots.graph, cancel);

        let Some(table) = roots.type_table else {
            return graph;
        };

        match graph {
            Ok(found) => {
                self.cross_check(reader, table, &found);
                Ok(found)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(error = %e, "node list walk failed, trying the type table");
                self.types.locate(reader, table, &self.config.locator)
            }
        }
    }

    fn cross_check<R: MemoryReader>(&self, reader: &R, table: TypeTable, found: &LocateResult) {
        match self.types.locate(reader, table, &self.config.locator) {
            Ok(other) if other.root_address != found.root_address => {
                warn!(
                    walk = format_args!("0x{:X}", found.root_address),
                    type_table = format_args!("0x{:X}", other.root_address),
                    "session root routes disagree, keeping the walk result"
                );
            }
            Ok(_) => debug!("session root confirmed through type table"),
            Err(e) => debug!(error = %e, "type table cross-check unavailable"),
        }
    }
}
