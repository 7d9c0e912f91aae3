use serde::Deserialize;

use mossmq_codec::QoS;

use crate::error::{Error, ErrorKind};

/// Broker-wide options from spec §6, independent of any one listener.
#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Upper bound on tick latency for the selector's `select(timeout)`
    /// call, in milliseconds. Bounds the staleness of `cleanup_operations`.
    #[serde(default = "General::default_select_tick_ms")]
    select_tick_ms: u64,

    /// Time between `$SYS/broker/...` status publishes, in seconds.
    /// 0 disables them.
    #[serde(default = "General::default_sys_interval_secs")]
    sys_interval_secs: u32,

    /// Upper bound a client may request for `SessionExpiryInterval`;
    /// `None` means unbounded (spec default).
    #[serde(default = "General::default_maximum_session_expiry_interval")]
    maximum_session_expiry_interval: Option<u32>,

    #[serde(default = "General::default_receive_maximum")]
    receive_maximum: u16,

    #[serde(default = "General::default_maximum_qos")]
    maximum_qos: u8,

    #[serde(default = "General::default_retain_available")]
    retain_available: bool,

    #[serde(default = "General::default_wildcard_subscription_available")]
    wildcard_subscription_available: bool,

    #[serde(default = "General::default_subscription_identifier_available")]
    subscription_identifier_available: bool,

    #[serde(default = "General::default_shared_subscription_available")]
    shared_subscription_available: bool,

    /// Overrides a client's requested keep-alive if set.
    #[serde(default = "General::default_server_keep_alive")]
    server_keep_alive: Option<u16>,

    #[serde(default = "General::default_topic_alias_maximum")]
    topic_alias_maximum: u16,

    #[serde(default = "General::default_cluster_enabled")]
    cluster_enabled: bool,

    /// Non-zero bounds total on-wire packet size; 0 means no limit.
    #[serde(default = "General::default_maximum_packet_size")]
    maximum_packet_size: u32,
}

impl General {
    #[must_use]
    pub const fn default_select_tick_ms() -> u64 {
        250
    }

    #[must_use]
    pub const fn default_sys_interval_secs() -> u32 {
        3
    }

    #[must_use]
    pub const fn default_maximum_session_expiry_interval() -> Option<u32> {
        None
    }

    #[must_use]
    pub const fn default_receive_maximum() -> u16 {
        65535
    }

    #[must_use]
    pub const fn default_maximum_qos() -> u8 {
        QoS::ExactlyOnce as u8
    }

    #[must_use]
    pub const fn default_retain_available() -> bool {
        true
    }

    #[must_use]
    pub const fn default_wildcard_subscription_available() -> bool {
        true
    }

    #[must_use]
    pub const fn default_subscription_identifier_available() -> bool {
        true
    }

    #[must_use]
    pub const fn default_shared_subscription_available() -> bool {
        true
    }

    #[must_use]
    pub const fn default_server_keep_alive() -> Option<u16> {
        None
    }

    #[must_use]
    pub const fn default_topic_alias_maximum() -> u16 {
        0
    }

    #[must_use]
    pub const fn default_cluster_enabled() -> bool {
        false
    }

    #[must_use]
    pub const fn default_maximum_packet_size() -> u32 {
        0
    }

    #[must_use]
    pub const fn select_tick_ms(&self) -> u64 {
        self.select_tick_ms
    }

    #[must_use]
    pub const fn sys_interval_secs(&self) -> u32 {
        self.sys_interval_secs
    }

    #[must_use]
    pub const fn maximum_session_expiry_interval(&self) -> Option<u32> {
        self.maximum_session_expiry_interval
    }

    #[must_use]
    pub const fn receive_maximum(&self) -> u16 {
        self.receive_maximum
    }

    #[must_use]
    pub fn maximum_qos(&self) -> QoS {
        QoS::try_from(self.maximum_qos).unwrap_or(QoS::ExactlyOnce)
    }

    #[must_use]
    pub const fn retain_available(&self) -> bool {
        self.retain_available
    }

    #[must_use]
    pub const fn wildcard_subscription_available(&self) -> bool {
        self.wildcard_subscription_available
    }

    #[must_use]
    pub const fn subscription_identifier_available(&self) -> bool {
        self.subscription_identifier_available
    }

    #[must_use]
    pub const fn shared_subscription_available(&self) -> bool {
        self.shared_subscription_available
    }

    #[must_use]
    pub const fn server_keep_alive(&self) -> Option<u16> {
        self.server_keep_alive
    }

    #[must_use]
    pub const fn topic_alias_maximum(&self) -> u16 {
        self.topic_alias_maximum
    }

    #[must_use]
    pub const fn cluster_enabled(&self) -> bool {
        self.cluster_enabled
    }

    #[must_use]
    pub const fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// # Errors
    /// Returns an error if `receive_maximum` is zero, which MQTT 5 forbids.
    pub fn validate(&self) -> Result<(), Error> {
        if self.receive_maximum == 0 {
            return Err(Error::new(
                ErrorKind::Config,
                "receive_maximum must be non-zero",
            ));
        }
        if self.maximum_qos > 2 {
            return Err(Error::new(ErrorKind::Config, "maximum_qos must be 0, 1 or 2"));
        }
        Ok(())
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            select_tick_ms: Self::default_select_tick_ms(),
            sys_interval_secs: Self::default_sys_interval_secs(),
            maximum_session_expiry_interval: Self::default_maximum_session_expiry_interval(),
            receive_maximum: Self::default_receive_maximum(),
            maximum_qos: Self::default_maximum_qos(),
            retain_available: Self::default_retain_available(),
            wildcard_subscription_available: Self::default_wildcard_subscription_available(),
            subscription_identifier_available: Self::default_subscription_identifier_available(),
            shared_subscription_available: Self::default_shared_subscription_available(),
            server_keep_alive: Self::default_server_keep_alive(),
            topic_alias_maximum: Self::default_topic_alias_maximum(),
            cluster_enabled: Self::default_cluster_enabled(),
            maximum_packet_size: Self::default_maximum_packet_size(),
        }
    }
}
