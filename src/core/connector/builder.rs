//=========================================================================
// Connector Builder
//=========================================================================

//=== Internal Dependencies ===============================================

use super::{ConnectorKind, ConnectorRef, EntityConnector, KindInfo};
use crate::core::node::{Attachment, Node, NodeRef};

//=== ConnectorBuilder ====================================================

/// Builder for [`EntityConnector`].
///
/// Nodes added with [`node`](Self::node) land on the root attachment;
/// [`child`](Self::child) nests a whole attachment subtree. `build` runs
/// node discovery once.
pub struct ConnectorBuilder {
    pub(super) name: String,
    pub(super) order: i32,
    pub(super) entity_id: u32,
    pub(super) tag: Option<String>,
    pub(super) kind: KindInfo,
    pub(super) attachment: Attachment,
    pub(super) enabled_ticks: bool,
    pub(super) active: bool,
}

impl ConnectorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            attachment: Attachment::new(name.clone()),
            name,
            order: 0,
            entity_id: 0,
            tag: None,
            kind: KindInfo::of::<EntityConnector>(),
            enabled_ticks: true,
            active: true,
        }
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Manual id. `0` leaves the id to be allocated at registration.
    pub fn entity_id(mut self, id: u32) -> Self {
        self.entity_id = id;
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = super::entity_connector::normalize_tag(tag);
        self
    }

    pub fn kind<K: ConnectorKind>(mut self) -> Self {
        self.kind = KindInfo::of::<K>();
        self
    }

    pub fn node<N: Node>(mut self, value: N) -> Self {
        self.attachment = self.attachment.with_node(value);
        self
    }

    pub fn node_ref(mut self, node: NodeRef) -> Self {
        self.attachment.attach(node);
        self
    }

    pub fn child(mut self, child: Attachment) -> Self {
        self.attachment.attach_child(child);
        self
    }

    /// Replaces the root attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn enabled_ticks(mut self, enabled: bool) -> Self {
        self.enabled_ticks = enabled;
        self
    }

    /// Host-side active flag. Inactive connectors are skipped by scene
    /// dispatch and are not executed on registration.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn build(self) -> ConnectorRef {
        let connector = EntityConnector::from_builder(self);
        connector.collect_nodes();
        connector
    }
}
