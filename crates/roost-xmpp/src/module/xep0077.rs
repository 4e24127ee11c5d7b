//! XEP-0077: In-Band Registration
//!
//! ## Protocol Flow
//!
//! 1. Client requests the registration form:
//!    ```xml
//!    <iq type='get' id='reg1'>
//!      <query xmlns='jabber:iq:register'/>
//!    </iq>
//!    ```
//!
//! 2. Server responds with the required fields (`<registered/>` is added when
//!    the stream is already authenticated).
//!
//! 3. An unauthenticated stream submits `<username/>` and `<password/>` to
//!    create an account; an authenticated one submits them to change its
//!    password, or sends `<remove/>` to cancel the account.
//!
//! Each of the three operations is individually enabled by configuration.

use std::sync::Arc;

use async_trait::async_trait;
use minidom::Element;
use tracing::{debug, info};
use xmpp_parsers::iq::{Iq, IqType};

use super::{send_reply, DiscoInfo, IqHandler, Module, RegistrationConfig};
use crate::c2s::C2sStream;
use crate::error::iq_result;
use crate::storage::{Storage, User};
use crate::XmppError;

/// Namespace for XEP-0077 In-Band Registration
pub const NS_REGISTER: &str = "jabber:iq:register";

/// In-band registration handler.
pub struct Register {
    storage: Arc<dyn Storage>,
    config: RegistrationConfig,
}

/// Username and password fields of a submitted form.
#[derive(Debug)]
struct Credentials {
    username: String,
    password: String,
}

fn parse_credentials(query: &Element) -> Result<Credentials, XmppError> {
    let field = |name: &str| {
        query
            .get_child(name, NS_REGISTER)
            .map(|e| e.text())
            .unwrap_or_default()
    };
    let username = field("username");
    let password = field("password");
    if username.is_empty() || password.is_empty() {
        return Err(XmppError::bad_request(Some(
            "Username and password are required".to_string(),
        )));
    }
    Ok(Credentials { username, password })
}

impl Register {
    pub fn new(disco: &DiscoInfo, storage: Arc<dyn Storage>, config: RegistrationConfig) -> Self {
        disco.register_server_feature(NS_REGISTER);
        Self { storage, config }
    }

    fn form(&self, iq: &Iq, stream: &dyn C2sStream) -> Iq {
        let mut query = Element::builder("query", NS_REGISTER);
        if stream.is_authenticated() {
            query = query
                .append(Element::builder("registered", NS_REGISTER).build())
                .append(
                    Element::builder("username", NS_REGISTER)
                        .append(stream.username().to_string())
                        .build(),
                );
        } else {
            query = query
                .append(
                    Element::builder("instructions", NS_REGISTER)
                        .append("Choose a username and password.".to_string())
                        .build(),
                )
                .append(Element::builder("username", NS_REGISTER).build());
        }
        let query = query
            .append(Element::builder("password", NS_REGISTER).build())
            .build();
        iq_result(iq, Some(query))
    }

    async fn register(&self, iq: &Iq, query: &Element) -> Result<Iq, XmppError> {
        if !self.config.allow_registration {
            return Err(XmppError::not_allowed(None));
        }
        let creds = parse_credentials(query)?;
        if self.storage.user_exists(&creds.username).await? {
            return Err(XmppError::conflict(None));
        }
        self.storage
            .upsert_user(User {
                username: creds.username.clone(),
                password: creds.password,
            })
            .await?;
        info!(username = %creds.username, "Account registered");
        Ok(iq_result(iq, None))
    }

    async fn cancel(&self, iq: &Iq, stream: &dyn C2sStream) -> Result<Iq, XmppError> {
        if !self.config.allow_cancel {
            return Err(XmppError::not_allowed(None));
        }
        self.storage.delete_user(stream.username()).await?;
        info!(username = %stream.username(), "Account cancelled");
        Ok(iq_result(iq, None))
    }

    async fn change_password(
        &self,
        iq: &Iq,
        query: &Element,
        stream: &dyn C2sStream,
    ) -> Result<Iq, XmppError> {
        if !self.config.allow_change {
            return Err(XmppError::not_allowed(None));
        }
        let creds = parse_credentials(query)?;
        if creds.username != stream.username() {
            return Err(XmppError::bad_request(Some(
                "Cannot change another account's password".to_string(),
            )));
        }
        self.storage
            .upsert_user(User {
                username: creds.username,
                password: creds.password,
            })
            .await?;
        info!(username = %stream.username(), "Password changed");
        Ok(iq_result(iq, None))
    }

    async fn handle(&self, iq: &Iq, stream: &dyn C2sStream) -> Result<Iq, XmppError> {
        match &iq.payload {
            IqType::Get(_) => {
                debug!(id = %iq.id, "Registration form requested");
                Ok(self.form(iq, stream))
            }
            IqType::Set(query) if !stream.is_authenticated() => self.register(iq, query).await,
            IqType::Set(query) if query.has_child("remove", NS_REGISTER) => {
                self.cancel(iq, stream).await
            }
            IqType::Set(query) => self.change_password(iq, query, stream).await,
            _ => Err(XmppError::bad_request(None)),
        }
    }
}

#[async_trait]
impl Module for Register {
    fn name(&self) -> &'static str {
        "registration"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for Register {
    fn matches_iq(&self, iq: &Iq) -> bool {
        match &iq.payload {
            IqType::Get(elem) | IqType::Set(elem) => elem.is("query", NS_REGISTER),
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        let outcome = self.handle(&iq, stream.as_ref()).await;
        send_reply(stream.as_ref(), &iq, outcome);
    }
}
