//! Link-layer IP interfaces
//!
//! Same identifiers and properties as network interfaces, looked up with the
//! interface index first.

use tracing::info;

use super::WindowsClient;
use super::network_interface::{InterfaceKey, InterfaceProperties, InterfaceQuery, InterfaceScript};
use crate::error::{ObjectKind, Result};

pub type LinkIpInterfaceQuery = InterfaceQuery;
pub type LinkIpInterfaceProperties = InterfaceProperties;

/// Index, alias, description, GUID, MAC, adapter name, virtual adapter name
pub(crate) const LINK_IP_INTERFACE_PRECEDENCE: [InterfaceKey; 7] = [
    InterfaceKey::Index,
    InterfaceKey::Alias,
    InterfaceKey::Description,
    InterfaceKey::Guid,
    InterfaceKey::MacAddress,
    InterfaceKey::NetworkAdapterName,
    InterfaceKey::VNetworkAdapterName,
];

const READ_LINK_IP_INTERFACE: InterfaceScript =
    InterfaceScript::new("readLinkIPInterface", ObjectKind::LinkIpInterface);

impl InterfaceQuery {
    pub fn link_selector(&self) -> Option<String> {
        self.selector_in(&LINK_IP_INTERFACE_PRECEDENCE)
    }

    pub fn link_narrowed(&self) -> Result<Self> {
        self.narrowed_in(&LINK_IP_INTERFACE_PRECEDENCE, ObjectKind::LinkIpInterface)
    }
}

impl WindowsClient {
    /// Read a link IP interface
    pub async fn read_link_ip_interface(
        &self,
        query: &LinkIpInterfaceQuery,
    ) -> Result<LinkIpInterfaceProperties> {
        let narrowed = query.link_narrowed()?;
        let script = READ_LINK_IP_INTERFACE.render_json(&narrowed)?;
        let properties: LinkIpInterfaceProperties = self.run_json(&script).await?;
        info!(
            kind = %ObjectKind::LinkIpInterface,
            id = narrowed.link_selector().unwrap_or_default(),
            index = properties.index,
            "read link ip interface"
        );
        Ok(properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_precedence_puts_guid_after_description() {
        let query = InterfaceQuery {
            guid: "6D0E9A3A-3C4B-4B7A-9A1E-3F1C2B4D5E6F".to_string(),
            description: "Hyper-V Virtual Ethernet Adapter".to_string(),
            ..InterfaceQuery::default()
        };
        assert_eq!(query.link_selector().as_deref(), Some("Hyper-V Virtual Ethernet Adapter"));
        assert_eq!(query.selector().as_deref(), Some(query.guid.as_str()));

        let narrowed = query.link_narrowed().unwrap();
        assert!(narrowed.guid.is_empty());
        assert_eq!(narrowed.description, "Hyper-V Virtual Ethernet Adapter");
    }

    #[test]
    fn test_empty_link_query_names_its_kind() {
        let err = InterfaceQuery::default().link_narrowed().unwrap_err();
        assert!(err.to_string().contains("link_ip_interface"));
    }
}
