//! Login for a freshly dialed connection: private key first, then password.

use russh::client::Handle;
use std::sync::Arc;

use crate::endpoint::ServerEndpoint;
use crate::error::Error;

/// Connection handler for `russh`.
#[derive(Debug, Clone, Default)]
pub struct ClientHandler;

impl russh::client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        // any host key is accepted, there is no known_hosts handling
        Ok(true)
    }
}

fn session_error(endpoint: &ServerEndpoint) -> impl FnOnce(russh::Error) -> Error + '_ {
    move |source| Error::Session {
        host: endpoint.host.clone(),
        port: endpoint.port,
        source,
    }
}

async fn try_key(
    handle: &mut Handle<ClientHandler>,
    endpoint: &ServerEndpoint,
) -> Result<bool, Error> {
    let Some(key) = &endpoint.key else {
        return Ok(false);
    };
    let passphrase = key.passphrase.as_deref().map(String::as_str);
    let private_key = match russh::keys::load_secret_key(&key.path, passphrase) {
        Ok(private_key) => private_key,
        Err(err) => {
            tracing::warn!(
                "Skipping private key {:?} for {}: {}",
                key.path,
                endpoint.id(),
                err
            );
            return Ok(false);
        }
    };
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(session_error(endpoint))?
        .flatten();
    let auth = handle
        .authenticate_publickey(
            endpoint.username.as_str(),
            russh::keys::PrivateKeyWithHashAlg::new(Arc::new(private_key), hash_alg),
        )
        .await
        .map_err(session_error(endpoint))?;
    Ok(auth.success())
}

async fn try_password(
    handle: &mut Handle<ClientHandler>,
    endpoint: &ServerEndpoint,
) -> Result<bool, Error> {
    let Some(password) = &endpoint.password else {
        return Ok(false);
    };
    let auth = handle
        .authenticate_password(endpoint.username.as_str(), password.as_str())
        .await
        .map_err(session_error(endpoint))?;
    Ok(auth.success())
}

pub(crate) async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    endpoint: &ServerEndpoint,
) -> Result<(), Error> {
    if try_key(handle, endpoint).await? {
        tracing::debug!("Authenticated to {} with private key", endpoint.id());
        return Ok(());
    }
    if try_password(handle, endpoint).await? {
        tracing::debug!("Authenticated to {} with password", endpoint.id());
        return Ok(());
    }
    Err(Error::AuthenticationFailed {
        host: endpoint.host.clone(),
        port: endpoint.port,
        user: endpoint.username.clone(),
    })
}
