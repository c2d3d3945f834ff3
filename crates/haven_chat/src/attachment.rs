//! Request-scoped attachment storage.
//!
//! Every slot is keyed by the [`RequestId`] that bound it, and a handle can
//! only ever resolve its own request's slot. There is no "current image"
//! anywhere in the process: generation work for a request receives the handle
//! as an argument, and a turn without an image simply has no handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ChatError, ChatResult, ToolError};
use crate::types::RequestId;

/// A binary attachment (an image) sent with a turn.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl Attachment {
    pub fn new(bytes: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    /// Reject payloads the vision model cannot use.
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.bytes.is_empty() || !self.media_type.starts_with("image/") {
            return Err(ToolError::InvalidAttachment);
        }
        Ok(())
    }

    /// `data:` URL carrying the base64 payload.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Reference to the attachment bound for one request.
///
/// Only [`AttachmentStore::bind`] creates handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentHandle {
    request_id: RequestId,
}

impl AttachmentHandle {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

/// Attachment slots keyed by request.
#[derive(Default)]
pub struct AttachmentStore {
    slots: RwLock<HashMap<RequestId, Arc<Attachment>>>,
}

impl AttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the single attachment of `request_id`.
    pub fn bind(&self, request_id: RequestId, attachment: Attachment) -> ChatResult<AttachmentHandle> {
        let mut slots = self.slots.write();
        if slots.contains_key(&request_id) {
            return Err(ChatError::AttachmentAlreadyBound(request_id));
        }
        debug!(
            request_id = %request_id,
            media_type = %attachment.media_type,
            bytes = attachment.bytes.len(),
            "Binding attachment"
        );
        slots.insert(request_id, Arc::new(attachment));
        Ok(AttachmentHandle { request_id })
    }

    /// Bind and return a guard that releases the slot when dropped.
    pub fn bind_scoped(
        self: &Arc<Self>,
        request_id: RequestId,
        attachment: Attachment,
    ) -> ChatResult<AttachmentGuard> {
        let handle = self.bind(request_id, attachment)?;
        Ok(AttachmentGuard {
            store: Arc::clone(self),
            handle,
        })
    }

    pub fn resolve(&self, handle: &AttachmentHandle) -> ChatResult<Arc<Attachment>> {
        self.slots
            .read()
            .get(&handle.request_id)
            .cloned()
            .ok_or(ChatError::AttachmentNotFound(handle.request_id))
    }

    /// Drop the slot. Releasing twice is a no-op.
    pub fn release(&self, handle: &AttachmentHandle) {
        if self.slots.write().remove(&handle.request_id).is_some() {
            debug!(request_id = %handle.request_id, "Released attachment");
        }
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

/// Owns a bound slot for the lifetime of a request.
pub struct AttachmentGuard {
    store: Arc<AttachmentStore>,
    handle: AttachmentHandle,
}

impl AttachmentGuard {
    pub fn handle(&self) -> &AttachmentHandle {
        &self.handle
    }
}

impl Drop for AttachmentGuard {
    fn drop(&mut self) {
        self.store.release(&self.handle);
    }
}
