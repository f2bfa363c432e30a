//! Hand-rolled collaborator test doubles. No mocking framework is in the
//! dependency graph; each fake is a plain struct sharing its observable
//! state with the test via `Rc<RefCell<_>>`.

use std::cell::RefCell;
use std::net::Ipv6Addr;
use std::rc::Rc;

use dhcpv6_client_core::{
    AddressDadState, AddressFlags, AddressTable, ClientConfig, Duid, DuidSource, Interface,
    LinkLayerType, LinkStatus, Notification, ServiceHost, Socket,
};

#[derive(Default)]
pub struct FakeSocket {
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Socket for FakeSocket {
    fn transmit(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.sent.borrow_mut().push(packet.to_vec());
        Ok(())
    }
}

pub struct FakeInterface {
    pub name: String,
    pub link_layer_type: LinkLayerType,
    pub status: Rc<RefCell<LinkStatus>>,
}

impl FakeInterface {
    pub fn wired() -> Self {
        Self {
            name: "eth-test".to_string(),
            link_layer_type: LinkLayerType::Wired,
            status: Rc::new(RefCell::new(LinkStatus {
                valid: true,
                active: true,
                wake_on_same_network: true,
            })),
        }
    }
}

impl Interface for FakeInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn link_layer_index(&self) -> u32 {
        1
    }

    fn link_layer_type(&self) -> LinkLayerType {
        self.link_layer_type
    }

    fn link_status(&self) -> LinkStatus {
        *self.status.borrow()
    }
}

pub struct FakeDuidSource {
    pub duid: Duid,
    pub iaid: u32,
}

impl Default for FakeDuidSource {
    fn default() -> Self {
        Self {
            duid: Duid::new(vec![0x00, 0x03, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]),
            iaid: 1,
        }
    }
}

impl DuidSource for FakeDuidSource {
    fn establish_and_get(&mut self) -> Duid {
        self.duid.clone()
    }

    fn copy_random(&mut self, _interface_name: &str) -> Duid {
        Duid::new(vec![0x00, 0x04, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x00, 0x11])
    }

    fn allocate_iaid(&mut self, _interface_name: &str) -> u32 {
        self.iaid
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressTableCall {
    Add { addr: Ipv6Addr, prefix_len: u8, valid: u32, preferred: u32 },
    Remove { addr: Ipv6Addr },
}

#[derive(Default)]
pub struct FakeAddressTable {
    pub calls: Rc<RefCell<Vec<AddressTableCall>>>,
}

impl AddressTable for FakeAddressTable {
    fn add_address(
        &mut self,
        _interface_name: &str,
        address: Ipv6Addr,
        prefix_length: u8,
        flags: AddressFlags,
        valid_lifetime: u32,
        preferred_lifetime: u32,
    ) -> std::io::Result<()> {
        assert!(flags.contains(AddressFlags::DYNAMIC), "DHCPv6 client must only add DYNAMIC addresses");
        self.calls.borrow_mut().push(AddressTableCall::Add {
            addr: address,
            prefix_len: prefix_length,
            valid: valid_lifetime,
            preferred: preferred_lifetime,
        });
        Ok(())
    }

    fn remove_address(&mut self, _interface_name: &str, address: Ipv6Addr) -> std::io::Result<()> {
        self.calls.borrow_mut().push(AddressTableCall::Remove { addr: address });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeService {
    pub ssid: Option<String>,
    pub notifications: Rc<RefCell<Vec<Notification>>>,
}

impl ServiceHost for FakeService {
    fn get_ssid(&self) -> Option<String> {
        self.ssid.clone()
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.borrow_mut().push(notification);
    }
}

pub type TestClient = dhcpv6_client_core::Client<FakeSocket, FakeInterface, FakeDuidSource, FakeAddressTable, FakeService>;

pub struct Harness {
    pub client: TestClient,
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
    pub address_calls: Rc<RefCell<Vec<AddressTableCall>>>,
    pub notifications: Rc<RefCell<Vec<Notification>>>,
    pub link_status: Rc<RefCell<LinkStatus>>,
    pub server_duid: Duid,
}

impl Harness {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let sent = Rc::new(RefCell::new(Vec::new()));
        let address_calls = Rc::new(RefCell::new(Vec::new()));
        let notifications = Rc::new(RefCell::new(Vec::new()));

        let socket = FakeSocket { sent: sent.clone() };
        let interface = FakeInterface::wired();
        let link_status = interface.status.clone();
        let duid_source = FakeDuidSource::default();
        let address_table = FakeAddressTable { calls: address_calls.clone() };
        let service = FakeService { ssid: None, notifications: notifications.clone() };

        let client = dhcpv6_client_core::Client::with_config(
            socket,
            interface,
            duid_source,
            address_table,
            service,
            ClientConfig::default(),
        );

        Self {
            client,
            sent,
            address_calls,
            notifications,
            link_status,
            server_duid: Duid::new(vec![0x00, 0x02, 0xde, 0xad, 0xbe, 0xef]),
        }
    }

    pub fn last_sent(&self) -> Vec<u8> {
        self.sent.borrow().last().cloned().expect("expected a packet to have been sent")
    }

    pub fn sent_count(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn client_duid(&self) -> Duid {
        Duid::new(vec![0x00, 0x03, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07])
    }
}
