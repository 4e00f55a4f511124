use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::OnceLock;

/// 未设置地址时的占位值：`0.0.0.0:0`。
pub const UNSPECIFIED_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));

/// 会话的本地/目标地址对，纯值类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressPair {
    pub local: SocketAddr,
    pub target: SocketAddr,
}

impl AddressPair {
    pub const fn new(local: SocketAddr, target: SocketAddr) -> Self {
        Self { local, target }
    }
}

impl Default for AddressPair {
    fn default() -> Self {
        Self::new(UNSPECIFIED_ADDR, UNSPECIFIED_ADDR)
    }
}

/// 会话内部持有的写一次地址槽。
///
/// 连接/接受完成后各写入一次；之后只读，因此读取无需加锁。
#[derive(Debug, Default)]
pub(crate) struct AddressSlots {
    local: OnceLock<SocketAddr>,
    target: OnceLock<SocketAddr>,
}

impl AddressSlots {
    /// 返回 `false` 表示地址此前已写入，本次写入被忽略。
    pub(crate) fn set_local(&self, addr: SocketAddr) -> bool {
        self.local.set(addr).is_ok()
    }

    pub(crate) fn set_target(&self, addr: SocketAddr) -> bool {
        self.target.set(addr).is_ok()
    }

    pub(crate) fn local(&self) -> SocketAddr {
        self.local.get().copied().unwrap_or(UNSPECIFIED_ADDR)
    }

    pub(crate) fn target(&self) -> SocketAddr {
        self.target.get().copied().unwrap_or(UNSPECIFIED_ADDR)
    }

    pub(crate) fn pair(&self) -> AddressPair {
        AddressPair::new(self.local(), self.target())
    }
}
