//! Login and registration over `jabber:iq:register`.

use thiserror::Error;

use kikcore_xml::{Node, NodeBuilder, marshal, text_node};

use crate::chat_list::decode_chat_list_base64;
use crate::credentials::{Credentials, password_key};
use crate::handshake::DEVICE_PREFIX;
use crate::request::{InfoQuery, NS_REGISTER};

/// Appended to a captcha URL so the solved page redirects back to the client.
pub const CAPTCHA_CALLBACK_SUFFIX: &str = "&callback_url=https://kik.com/captcha-url";

/// Device description sent with login and registration.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub device_type: String,
    pub brand: String,
    pub model: String,
    pub android_sdk: String,
    pub operator: String,
    pub install_date: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            device_type: "android".into(),
            brand: "samsung".into(),
            model: "SM-G930F".into(),
            android_sdk: "26".into(),
            operator: "310260".into(),
            install_date: "1494078709023".into(),
        }
    }
}

/// A login attempt. `captcha_response` resumes a captcha challenge.
#[derive(Debug, Clone)]
pub struct LoginRequest<'a> {
    pub credentials: &'a Credentials,
    pub version: &'a str,
    pub lang: &'a str,
    pub device: &'a DeviceProfile,
    pub captcha_response: Option<&'a str>,
}

impl LoginRequest<'_> {
    pub fn to_query(&self) -> InfoQuery<'static> {
        let creds = self.credentials;
        let passkey = creds.password_key();
        let mut content = if creds.is_email() {
            vec![text_node("email", &creds.username), text_node("passkey-e", passkey)]
        } else {
            vec![text_node("username", &creds.username), text_node("passkey-u", passkey)]
        };
        content.extend(device_fields(creds, self.version, self.lang, self.device, "1", "0"));
        if let Some(response) = self.captcha_response {
            content.push(captcha_node(response));
        }
        InfoQuery::set(NS_REGISTER, content)
    }
}

/// Account creation. Runs over the anonymous connection like login.
#[derive(Debug, Clone)]
pub struct RegisterRequest<'a> {
    pub credentials: &'a Credentials,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    /// `YYYY-MM-DD`.
    pub birthday: &'a str,
    pub version: &'a str,
    pub lang: &'a str,
    pub device: &'a DeviceProfile,
    pub captcha_response: Option<&'a str>,
}

impl RegisterRequest<'_> {
    pub fn to_query(&self) -> InfoQuery<'static> {
        let creds = self.credentials;
        let mut content = vec![
            text_node("email", self.email),
            text_node("passkey-e", password_key(self.email, &creds.password)),
            text_node("passkey-u", creds.password_key()),
            text_node("username", &creds.username),
            text_node("first", self.first_name),
            text_node("last", self.last_name),
            text_node("birthday", self.birthday),
        ];
        content.extend(device_fields(creds, self.version, self.lang, self.device, "0", "1"));
        if let Some(response) = self.captcha_response {
            content.push(captcha_node(response));
        }
        InfoQuery::set(NS_REGISTER, content)
    }
}

fn device_fields(
    creds: &Credentials,
    version: &str,
    lang: &str,
    device: &DeviceProfile,
    logins: &str,
    registrations: &str,
) -> Vec<Node> {
    vec![
        text_node("device-id", &creds.device_id),
        text_node("install-referrer", "utm_source=google-play&utm_medium=organic"),
        text_node("operator", &device.operator),
        text_node("install-date", &device.install_date),
        text_node("device-type", &device.device_type),
        text_node("brand", &device.brand),
        text_node("logins-since-install", logins),
        text_node("version", version),
        text_node("lang", lang),
        text_node("android-sdk", &device.android_sdk),
        text_node("registrations-since-install", registrations),
        text_node("prefix", DEVICE_PREFIX),
        text_node("android-id", &creds.android_id),
        text_node("model", &device.model),
    ]
}

fn captcha_node(response: &str) -> Node {
    NodeBuilder::new("challenge")
        .children([text_node("response", response)])
        .build()
}

/// Account details returned by a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginResult {
    pub node: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub chat_list: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoginFailure {
    #[error("account is not registered")]
    NotRegistered,
    #[error("password does not match")]
    PasswordMismatch,
    #[error("captcha required: {url}")]
    CaptchaRequired { url: String },
    #[error("account has been terminated")]
    AccountTerminated,
    #[error("login failed (code {code:?}): {raw}")]
    Other { code: Option<String>, raw: String },
}

/// Reads the `<query>` of a register reply.
///
/// `None` means the reply has neither a node nor an error of any kind,
/// which callers treat as a parse failure. An error reply without a
/// `<query>` is still a login failure.
pub fn parse_register_result(iq: &Node) -> Option<Result<LoginResult, LoginFailure>> {
    let Some(query) = iq.get_optional_child("query") else {
        return (iq.get_attr("type") == Some("error")).then(|| Err(other_failure(iq, None)));
    };

    if let Some(node) = query.child_text("node") {
        let chat_list = find_descendant(query, &|n| {
            n.tag == "record" && n.get_attr("pk") == Some("chat_list_bins")
        })
        .and_then(Node::text)
        .and_then(|text| match decode_chat_list_base64(text) {
            Ok(list) => Some(list),
            Err(e) => {
                log::warn!(target: "Login", "Ignoring undecodable chat list: {e}");
                None
            }
        })
        .unwrap_or_default();
        return Some(Ok(LoginResult {
            node: node.trim().to_string(),
            username: query.child_text("username").map(str::to_string),
            email: query.child_text("email").map(str::to_string),
            first_name: query.child_text("first").map(str::to_string),
            last_name: query.child_text("last").map(str::to_string),
            chat_list,
        }));
    }

    if let Some(url) = find_descendant(query, &|n| n.tag == "captcha-url").and_then(Node::text) {
        return Some(Err(LoginFailure::CaptchaRequired {
            url: format!("{}{CAPTCHA_CALLBACK_SUFFIX}", url.trim()),
        }));
    }
    if find_descendant(query, &|n| n.tag == "password-mismatch").is_some() {
        return Some(Err(LoginFailure::PasswordMismatch));
    }
    if find_descendant(query, &|n| n.tag == "not-registered").is_some() {
        return Some(Err(LoginFailure::NotRegistered));
    }
    if find_descendant(query, &|n| n.tag == "acct-terminated").is_some() {
        return Some(Err(LoginFailure::AccountTerminated));
    }

    let error = query
        .get_optional_child("error")
        .or_else(|| iq.get_optional_child("error"));
    if iq.get_attr("type") == Some("error") || error.is_some() {
        return Some(Err(other_failure(iq, error)));
    }
    None
}

fn other_failure(iq: &Node, error: Option<&Node>) -> LoginFailure {
    let error = error.or_else(|| iq.get_optional_child("error"));
    LoginFailure::Other {
        code: error.and_then(|e| e.get_attr("code")).map(str::to_string),
        raw: marshal(iq),
    }
}

fn find_descendant<'a>(node: &'a Node, pred: &dyn Fn(&Node) -> bool) -> Option<&'a Node> {
    for child in node.children().into_iter().flatten() {
        if pred(child) {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, pred) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_list::encode_chat_list;
    use base64::Engine as _;
    use kikcore_xml::unmarshal;

    fn creds(username: &str) -> Credentials {
        Credentials::new(username, "secret", "d0d0", "a1a1")
    }

    #[test]
    fn login_uses_username_or_email_passkey() {
        let device = DeviceProfile::default();
        let c = creds("alice");
        let req = LoginRequest {
            credentials: &c,
            version: "15.25.0.22493",
            lang: "en_US",
            device: &device,
            captcha_response: None,
        };
        let iq = req.to_query().build("id1");
        let query = iq.get_optional_child("query").unwrap();
        assert_eq!(query.get_attr("xmlns"), Some(NS_REGISTER));
        assert_eq!(query.child_text("username"), Some("alice"));
        assert_eq!(query.child_text("passkey-u"), Some(c.password_key().as_str()));
        assert!(query.get_optional_child("challenge").is_none());

        let e = creds("alice@example.com");
        let req = LoginRequest {
            credentials: &e,
            captcha_response: Some("solved"),
            ..req
        };
        let iq = req.to_query().build("id2");
        let query = iq.get_optional_child("query").unwrap();
        assert!(query.child_text("passkey-e").is_some());
        assert_eq!(
            query.get_optional_child_by_tag(&["challenge", "response"]).and_then(Node::text),
            Some("solved")
        );
    }

    #[test]
    fn success_captures_node_and_chat_list() {
        let bins = base64::prelude::BASE64_STANDARD
            .encode(encode_chat_list(&["bob_x1@talk.kik.com"]).unwrap());
        let xml = format!(
            r#"<iq type="result" id="1"><query xmlns="jabber:iq:register"><node>foo_ab1</node><username>foo</username><xdata xmlns="kik:iq:xdata"><record pk="chat_list_bins">{bins}</record></xdata></query></iq>"#
        );
        let iq = unmarshal(xml.as_bytes()).unwrap();
        let result = parse_register_result(&iq).unwrap().unwrap();
        assert_eq!(result.node, "foo_ab1");
        assert_eq!(result.username.as_deref(), Some("foo"));
        assert_eq!(result.chat_list, vec!["bob_x1@talk.kik.com"]);
    }

    #[test]
    fn named_failures() {
        let captcha = unmarshal(
            br#"<iq type="error" id="1"><query xmlns="jabber:iq:register"><error code="406" type="modify"><captcha-url>https://captcha.kik.com/?id=42</captcha-url></error></query></iq>"#,
        )
        .unwrap();
        assert_eq!(
            parse_register_result(&captcha),
            Some(Err(LoginFailure::CaptchaRequired {
                url: "https://captcha.kik.com/?id=42&callback_url=https://kik.com/captcha-url".into()
            }))
        );

        for (tag, expected) in [
            ("password-mismatch", LoginFailure::PasswordMismatch),
            ("not-registered", LoginFailure::NotRegistered),
            ("acct-terminated", LoginFailure::AccountTerminated),
        ] {
            let xml = format!(
                r#"<iq type="error" id="1"><query xmlns="jabber:iq:register"><error code="406"><{tag}/></error></query></iq>"#
            );
            let iq = unmarshal(xml.as_bytes()).unwrap();
            assert_eq!(parse_register_result(&iq), Some(Err(expected)));
        }

        let other = unmarshal(
            br#"<iq type="error" id="1"><query xmlns="jabber:iq:register"><error code="500"><weird/></error></query></iq>"#,
        )
        .unwrap();
        assert!(matches!(
            parse_register_result(&other),
            Some(Err(LoginFailure::Other { code: Some(ref c), .. })) if c == "500"
        ));
    }

    #[test]
    fn error_reply_without_query_is_a_failure() {
        let iq = unmarshal(br#"<iq type="error" id="1"><error code="503"/></iq>"#).unwrap();
        match parse_register_result(&iq) {
            Some(Err(LoginFailure::Other { code, raw })) => {
                assert_eq!(code.as_deref(), Some("503"));
                assert_eq!(raw, r#"<iq type="error" id="1"><error code="503"/></iq>"#);
            }
            other => panic!("unexpected {other:?}"),
        }

        let empty = unmarshal(br#"<iq type="result" id="1"/>"#).unwrap();
        assert_eq!(parse_register_result(&empty), None);
    }
}
