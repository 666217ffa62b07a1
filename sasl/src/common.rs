//! Types shared across SASL mechanisms: credentials and channel binding.

/// Channel binding data to mix into a `-PLUS` SCRAM exchange.
///
/// XMPP client transports only ever provide TLS channel binding via the
/// RFC 9266 `tls-exporter` method (the older `tls-server-end-point` method
/// is not exposed by `tokio-rustls` and is not implemented here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelBinding {
    /// No channel binding data is available (plaintext connection, or the
    /// underlying TLS library does not expose exporter keying material).
    None,

    /// Exported keying material from the active TLS session, usable as the
    /// `tls-exporter` channel binding type.
    TlsExporter(Vec<u8>),
}

impl ChannelBinding {
    /// True if there is channel binding data to offer.
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Credentials used to authenticate a SASL exchange.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// The authentication identity (the XMPP node/localpart).
    pub username: String,

    /// The password, if the mechanism requires one.
    pub password: Option<String>,

    /// Channel binding data negotiated by the transport, if any.
    pub channel_binding: ChannelBinding,
}

impl Credentials {
    /// Build credentials for a username/password pair, with no channel
    /// binding.
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            channel_binding: ChannelBinding::None,
        }
    }

    /// Attach channel binding data to these credentials.
    pub fn with_channel_binding(mut self, channel_binding: ChannelBinding) -> Self {
        self.channel_binding = channel_binding;
        self
    }
}

/// SCRAM hash function selection.
///
/// Implemented for the marker types [`scram::Sha1`], [`scram::Sha256`] and
/// [`scram::Sha512`] in [`crate::client::mechanisms::scram`].
pub mod scram {
    use hmac::{Hmac, Mac};
    use pbkdf2::pbkdf2_hmac;

    /// A hash algorithm usable for SCRAM.
    pub trait ScramProvider {
        /// The SASL mechanism name, e.g. `SCRAM-SHA-1`.
        const NAME: &'static str;

        /// Output size of the hash function, in bytes.
        const OUTPUT_LEN: usize;

        /// Compute `HMAC(key, data)`.
        fn hmac(key: &[u8], data: &[u8]) -> Vec<u8>;

        /// Compute `H(data)`, the underlying hash function.
        fn hash(data: &[u8]) -> Vec<u8>;

        /// Compute `PBKDF2(HMAC(H), password, salt, iterations)`.
        fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8>;
    }

    /// `SCRAM-SHA-1`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Sha1;

    /// `SCRAM-SHA-256`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Sha256;

    /// `SCRAM-SHA-512`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Sha512;

    macro_rules! impl_scram_provider {
        ($name:ident, $mech:literal, $digest:ty, $len:literal) => {
            impl ScramProvider for $name {
                const NAME: &'static str = $mech;
                const OUTPUT_LEN: usize = $len;

                fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
                    let mut mac = <Hmac<$digest> as Mac>::new_from_slice(key)
                        .expect("HMAC accepts keys of any length");
                    mac.update(data);
                    mac.finalize().into_bytes().to_vec()
                }

                fn hash(data: &[u8]) -> Vec<u8> {
                    use sha2::Digest as _;
                    <$digest>::digest(data).to_vec()
                }

                fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
                    let mut out = vec![0u8; $len];
                    pbkdf2_hmac::<$digest>(password, salt, iterations, &mut out);
                    out
                }
            }
        };
    }

    impl_scram_provider!(Sha1, "SCRAM-SHA-1", sha1::Sha1, 20);
    impl_scram_provider!(Sha256, "SCRAM-SHA-256", sha2::Sha256, 32);
    impl_scram_provider!(Sha512, "SCRAM-SHA-512", sha2::Sha512, 64);
}
