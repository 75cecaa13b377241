//! Live parameter editing.
//!
//! Edits apply to the local [`LiveParams`] first, so the next session picks
//! them up whether or not the server hears about them. The patch is then
//! queued for `/update-params`. One forwarder task drains the queue, so the
//! server sees edits in the order they were made; a failed forward is
//! logged and otherwise ignored.

use std::sync::{Arc, OnceLock};

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::domain::{LiveParams, Nudge, ParamError, ParamField, ParamsPatch, SamplingConfig};
use crate::ports::{ControlError, ControlPort};

pub struct ParamsService {
    live: LiveParams,
    control: Arc<dyn ControlPort>,
    forwarder: OnceLock<mpsc::UnboundedSender<ParamsPatch>>,
}

impl ParamsService {
    pub fn new(live: LiveParams, control: Arc<dyn ControlPort>) -> Self {
        Self {
            live,
            control,
            forwarder: OnceLock::new(),
        }
    }

    /// The shared parameter state this service edits.
    pub const fn live(&self) -> &LiveParams {
        &self.live
    }

    /// Apply a patch locally and forward it to the server.
    ///
    /// An invalid patch is rejected before anything changes or is sent.
    pub fn apply(&self, patch: &ParamsPatch) -> Result<SamplingConfig, ParamError> {
        let config = self.live.apply(patch)?;
        self.forward(patch.clone());
        Ok(config)
    }

    /// Step a numeric field and forward the new value.
    pub fn nudge(&self, field: ParamField, direction: Nudge) -> Result<f64, ParamError> {
        let value = self.live.nudge(field, direction)?;
        let patch = ParamsPatch::parse_field(field.as_ref(), &value.to_string())?;
        self.forward(patch);
        Ok(value)
    }

    /// Validate and send a patch, waiting for the server's answer.
    ///
    /// The local state is only updated once the server accepted the patch.
    pub async fn push(&self, patch: &ParamsPatch) -> Result<SamplingConfig, PushError> {
        patch.validate()?;
        self.control.update_params(patch).await?;
        Ok(self.live.apply(patch)?)
    }

    fn forward(&self, patch: ParamsPatch) {
        if patch.is_empty() {
            return;
        }
        let Some(tx) = self.forwarder() else {
            tracing::debug!("No runtime; parameter update not forwarded");
            return;
        };
        if tx.send(patch).is_err() {
            tracing::debug!("Parameter forwarder stopped; update not forwarded");
        }
    }

    /// The queue into the forwarder task, started on first use.
    fn forwarder(&self) -> Option<&mpsc::UnboundedSender<ParamsPatch>> {
        if let Some(tx) = self.forwarder.get() {
            return Some(tx);
        }
        let handle = Handle::try_current().ok()?;
        Some(self.forwarder.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            handle.spawn(forward_patches(Arc::clone(&self.control), rx));
            tx
        }))
    }
}

/// Send queued patches one at a time until the service is dropped.
async fn forward_patches(
    control: Arc<dyn ControlPort>,
    mut patches: mpsc::UnboundedReceiver<ParamsPatch>,
) {
    while let Some(patch) = patches.recv().await {
        if let Err(e) = control.update_params(&patch).await {
            tracing::warn!(error = %e, "Failed to forward parameter update");
        }
    }
    tracing::debug!("Parameter forwarder exited");
}

/// Errors from [`ParamsService::push`].
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Control(#[from] ControlError),
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::eq;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ports::{ContextList, CurrentContext, PauseStatus};

    mock! {
        pub Control {}

        #[async_trait]
        impl ControlPort for Control {
            async fn update_params(&self, patch: &ParamsPatch) -> Result<(), ControlError>;
            async fn toggle_pause(&self) -> Result<PauseStatus, ControlError>;
            async fn contexts(&self) -> Result<ContextList, ControlError>;
            async fn set_context(&self, index: usize) -> Result<CurrentContext, ControlError>;
            async fn inject_tokens(&self, text: &str) -> Result<(), ControlError>;
        }
    }

    #[tokio::test]
    async fn test_apply_updates_live_state_and_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = MockControl::new();
        control
            .expect_update_params()
            .times(1)
            .returning(move |patch| {
                let _ = tx.send(patch.clone());
                Ok(())
            });

        let service = ParamsService::new(LiveParams::default(), Arc::new(control));
        let patch = ParamsPatch::parse_field("temperature", "0.7").unwrap();
        let config = service.apply(&patch).unwrap();

        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(rx.recv().await, Some(patch));
    }

    #[tokio::test]
    async fn test_invalid_patch_is_not_forwarded() {
        let mut control = MockControl::new();
        control.expect_update_params().never();

        let service = ParamsService::new(LiveParams::default(), Arc::new(control));
        let patch = ParamsPatch {
            top_p: Some(1.5),
            ..Default::default()
        };
        assert!(service.apply(&patch).is_err());
        assert!((service.live().snapshot().top_p - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_forward_failure_keeps_local_edit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = MockControl::new();
        control.expect_update_params().returning(move |_| {
            let _ = tx.send(());
            Err(ControlError::Request("connection refused".into()))
        });

        let service = ParamsService::new(LiveParams::default(), Arc::new(control));
        let value = service.nudge(ParamField::TopK, Nudge::Up).unwrap();

        assert!((value - 35.0).abs() < f64::EPSILON);
        rx.recv().await.unwrap();
        assert_eq!(service.live().snapshot().top_k, 35);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rapid_edits_reach_server_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut control = MockControl::new();
        control.expect_update_params().times(6).returning(move |patch| {
            let _ = tx.send(patch.top_k);
            Ok(())
        });

        let service = ParamsService::new(LiveParams::default(), Arc::new(control));
        for _ in 0..6 {
            service.nudge(ParamField::TopK, Nudge::Up).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(rx.recv().await.unwrap());
        }
        let expected: Vec<Option<u32>> = (1..=6_u32).map(|n| Some(30 + 5 * n)).collect();
        assert_eq!(seen, expected);
        assert_eq!(service.live().snapshot().top_k, 60);
    }

    #[tokio::test]
    async fn test_push_waits_for_server_before_applying() {
        let mut control = MockControl::new();
        control
            .expect_update_params()
            .with(eq(ParamsPatch::parse_field("top_k", "50").unwrap()))
            .times(1)
            .returning(|_| {
                Err(ControlError::Status {
                    status: 500,
                    body: "boom".into(),
                })
            });

        let service = ParamsService::new(LiveParams::default(), Arc::new(control));
        let err = service
            .push(&ParamsPatch::parse_field("top_k", "50").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Control(ControlError::Status { status: 500, .. })));
        assert_eq!(service.live().snapshot().top_k, 30);
    }
}
