use crate::client::Client;
use crate::contact::typed_response;
use crate::error::ClientError;
use crate::types::events::Event;
use kikcore::dispatch::IqResponse;
use kikcore::stanza::GroupAdminResult;
use kikcore::stanza::group::{join_group_query, leave_group_query};
use kikcore::xml::Jid;
use log::warn;

impl Client {
    /// Asks to join a public group with the code and token of a search
    /// result.
    ///
    /// The request matches what the official client sends, but servers have
    /// not been seen accepting it. Expect an error response.
    pub async fn join_group(
        &self,
        group: &Jid,
        code: &str,
        token: &str,
    ) -> Result<GroupAdminResult, ClientError> {
        warn!(target: "Client", "Joining {group} by code is unverified against live servers");
        self.group_admin(self.send_iq(join_group_query(group, code, token)).await?)
    }

    pub async fn leave_group(&self, group: &Jid) -> Result<GroupAdminResult, ClientError> {
        self.group_admin(self.send_iq(leave_group_query(group)).await?)
    }

    fn group_admin(&self, response: kikcore::xml::Node) -> Result<GroupAdminResult, ClientError> {
        let result = match typed_response(&response)? {
            IqResponse::GroupAdmin(result) => result,
            IqResponse::Empty => GroupAdminResult::default(),
            other => return Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        };
        self.event_bus.dispatch(Event::GroupAdmin(result.clone()));
        Ok(result)
    }
}
