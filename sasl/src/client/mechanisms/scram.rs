//! The `SCRAM-SHA-*` family of mechanisms (RFC 5802, RFC 7677, RFC 9266).

use core::marker::PhantomData;

use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine as _;
use getrandom::getrandom;

use crate::client::Mechanism;
use crate::common::scram::ScramProvider;
use crate::common::{ChannelBinding, Credentials};
use crate::error::MechanismError;

enum State {
    New,
    WaitingServerFirst {
        client_first_bare: String,
        gs2_header: Vec<u8>,
        cnonce: String,
    },
    WaitingServerFinal {
        server_signature: Vec<u8>,
    },
    Done,
}

/// A `SCRAM-SHA-*` (or `SCRAM-SHA-*-PLUS`) mechanism, generic over the hash
/// function used (see [`crate::common::scram`]).
pub struct Scram<P: ScramProvider> {
    name: String,
    username: String,
    password: String,
    channel_binding: ChannelBinding,
    use_plus: bool,
    state: State,
    _marker: PhantomData<P>,
}

fn saslprep_username(username: &str) -> String {
    // RFC 5802 section 5.1: escape `,` and `=` in the username.
    username.replace('=', "=3D").replace(',', "=2C")
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 24];
    getrandom(&mut bytes).expect("system RNG is available");
    base64_engine.encode(bytes)
}

impl<P: ScramProvider> Scram<P> {
    fn gs2_header(&self) -> Vec<u8> {
        if self.use_plus {
            b"p=tls-exporter,,".to_vec()
        } else {
            b"n,,".to_vec()
        }
    }
}

impl<P: ScramProvider> Mechanism for Scram<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn from_credentials(credentials: Credentials) -> Result<Self, MechanismError> {
        let password = credentials
            .password
            .ok_or(MechanismError::MissingCredential("password"))?;
        let use_plus = credentials.channel_binding.is_present();
        let name = if use_plus {
            format!("{}-PLUS", P::NAME)
        } else {
            P::NAME.to_string()
        };
        Ok(Self {
            name,
            username: credentials.username,
            password,
            channel_binding: credentials.channel_binding,
            use_plus,
            state: State::New,
            _marker: PhantomData,
        })
    }

    fn initial(&mut self) -> Vec<u8> {
        let gs2_header = self.gs2_header();
        let cnonce = random_nonce();
        let client_first_bare = format!("n={},r={}", saslprep_username(&self.username), cnonce);
        let mut out = gs2_header.clone();
        out.extend_from_slice(client_first_bare.as_bytes());
        self.state = State::WaitingServerFirst {
            client_first_bare,
            gs2_header,
            cnonce,
        };
        out
    }

    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        let (client_first_bare, gs2_header, cnonce) =
            match core::mem::replace(&mut self.state, State::Done) {
                State::WaitingServerFirst {
                    client_first_bare,
                    gs2_header,
                    cnonce,
                } => (client_first_bare, gs2_header, cnonce),
                _ => return Err(MechanismError::InvalidState),
            };

        let server_first = core::str::from_utf8(challenge)?.to_owned();

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for part in server_first.split(',') {
            if let Some(v) = part.strip_prefix("r=") {
                nonce = Some(v.to_owned());
            } else if let Some(v) = part.strip_prefix("s=") {
                salt = Some(base64_engine.decode(v)?);
            } else if let Some(v) = part.strip_prefix("i=") {
                iterations = v.parse::<u32>().ok();
            }
        }
        let nonce = nonce.ok_or_else(|| MechanismError::MalformedChallenge("missing nonce".into()))?;
        let salt = salt.ok_or_else(|| MechanismError::MalformedChallenge("missing salt".into()))?;
        let iterations = iterations
            .ok_or_else(|| MechanismError::MalformedChallenge("missing iteration count".into()))?;

        if !nonce.starts_with(&cnonce) {
            return Err(MechanismError::NonceMismatch);
        }

        let cbind_input = if self.use_plus {
            let cb_data = match &self.channel_binding {
                ChannelBinding::TlsExporter(data) => data.clone(),
                ChannelBinding::None => {
                    return Err(MechanismError::MalformedChallenge(
                        "channel binding requested but unavailable".into(),
                    ))
                }
            };
            let mut input = gs2_header.clone();
            input.extend_from_slice(&cb_data);
            input
        } else {
            gs2_header.clone()
        };
        let channel_binding_b64 = base64_engine.encode(&cbind_input);

        let client_final_without_proof = format!("c={},r={}", channel_binding_b64, nonce);
        let auth_message = format!(
            "{},{},{}",
            client_first_bare, server_first, client_final_without_proof
        );

        let salted_password = P::pbkdf2(self.password.as_bytes(), &salt, iterations);
        let client_key = P::hmac(&salted_password, b"Client Key");
        let stored_key = P::hash(&client_key);
        let client_signature = P::hmac(&stored_key, auth_message.as_bytes());
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        let server_key = P::hmac(&salted_password, b"Server Key");
        let server_signature = P::hmac(&server_key, auth_message.as_bytes());

        self.state = State::WaitingServerFinal { server_signature };

        let client_final = format!(
            "{},p={}",
            client_final_without_proof,
            base64_engine.encode(&client_proof)
        );
        Ok(client_final.into_bytes())
    }

    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        let server_signature = match core::mem::replace(&mut self.state, State::Done) {
            State::WaitingServerFinal { server_signature } => server_signature,
            _ => return Err(MechanismError::InvalidState),
        };

        let text = core::str::from_utf8(data)?;
        let got = text
            .strip_prefix("v=")
            .ok_or_else(|| MechanismError::MalformedChallenge("missing verifier".into()))?;
        let got = base64_engine.decode(got)?;
        if got != server_signature {
            return Err(MechanismError::ServerSignatureMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::scram::Sha1;

    #[test]
    fn plain_exchange_without_channel_binding_produces_valid_proof() {
        let creds = Credentials::new("user", "pencil");
        let mut mech = Scram::<Sha1>::from_credentials(creds).unwrap();
        assert_eq!(mech.name(), "SCRAM-SHA-1");
        let initial = mech.initial();
        assert!(initial.starts_with(b"n,,n=user,r="));

        let initial_str = core::str::from_utf8(&initial).unwrap();
        let cnonce = initial_str.strip_prefix("n,,n=user,r=").unwrap().to_owned();
        let server_nonce = format!("{cnonce}servernonce");

        let salt = base64_engine.encode(b"saltsalt");
        let server_first = format!("r={server_nonce},s={},i=4096", salt);
        let resp = mech.response(server_first.as_bytes()).unwrap();
        let resp_str = core::str::from_utf8(&resp).unwrap();
        assert!(resp_str.starts_with("c="));
        assert!(resp_str.contains(&format!(",r={server_nonce},p=")));
    }

    #[test]
    fn rejects_server_nonce_not_extending_client_nonce() {
        let creds = Credentials::new("user", "pencil");
        let mut mech = Scram::<Sha1>::from_credentials(creds).unwrap();
        mech.initial();

        let salt = base64_engine.encode(b"saltsalt");
        let server_first = format!("r=totally-unrelated-nonce,s={},i=4096", salt);
        let err = mech.response(server_first.as_bytes()).unwrap_err();
        assert!(matches!(err, MechanismError::NonceMismatch));
    }
}
