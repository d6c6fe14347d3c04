use super::auth::{AuthEvent, AuthState};
use super::reconcile::{reconcile, replace_event, ReconcileReport};
use crate::calendar::models::{CalendarIdentifier, Event};
use crate::calendar::provider::{AuthStart, Authorizer, CalendarProvider};
use crate::error::{component_error, other_error, CalendarResult};
use crate::tree::{EntryFields, MaterializedTree};
use crate::utils::scheduler::InFlightGuard;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// The account actor. It owns the provider and the tree, and runs one
/// command at a time so tree mutations never interleave.
pub struct AccountActor {
    name: String,
    provider: Arc<dyn CalendarProvider>,
    authorizer: Option<Arc<dyn Authorizer>>,
    tree: Arc<dyn MaterializedTree>,
    auth_tx: watch::Sender<AuthState>,
    command_rx: mpsc::Receiver<AccountCommand>,
}

/// Commands that can be sent to the account actor
pub enum AccountCommand {
    /// The guard keeps the account marked busy until the cycle is done
    Refresh(InFlightGuard, mpsc::Sender<CalendarResult<ReconcileReport>>),
    CreateEvent(Event, mpsc::Sender<CalendarResult<Event>>),
    DeleteEvent {
        uid: String,
        destroy_local_node: bool,
        response: mpsc::Sender<CalendarResult<()>>,
    },
    EditEvent {
        uid: String,
        replacement: Event,
        response: mpsc::Sender<CalendarResult<Event>>,
    },
    ListEvents(mpsc::Sender<Vec<Event>>),
    ListSubCalendars(mpsc::Sender<CalendarResult<Vec<CalendarIdentifier>>>),
    CheckAuth(mpsc::Sender<CalendarResult<AuthState>>),
    SubmitAuthCode(String, mpsc::Sender<CalendarResult<AuthState>>),
    Shutdown,
}

/// Handle for communicating with the account actor
#[derive(Clone)]
pub struct AccountActorHandle {
    command_tx: mpsc::Sender<AccountCommand>,
}

impl AccountActorHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(mpsc::Sender<T>) -> AccountCommand,
    ) -> CalendarResult<T> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(command(response_tx))
            .await
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Response channel closed"))
    }

    pub async fn refresh(&self, guard: InFlightGuard) -> CalendarResult<ReconcileReport> {
        self.request(|tx| AccountCommand::Refresh(guard, tx)).await?
    }

    pub async fn create_event(&self, event: Event) -> CalendarResult<Event> {
        self.request(|tx| AccountCommand::CreateEvent(event, tx))
            .await?
    }

    pub async fn delete_event(&self, uid: String, destroy_local_node: bool) -> CalendarResult<()> {
        self.request(|response| AccountCommand::DeleteEvent {
            uid,
            destroy_local_node,
            response,
        })
        .await?
    }

    pub async fn edit_event(&self, uid: String, replacement: Event) -> CalendarResult<Event> {
        self.request(|response| AccountCommand::EditEvent {
            uid,
            replacement,
            response,
        })
        .await?
    }

    pub async fn list_events(&self) -> CalendarResult<Vec<Event>> {
        self.request(AccountCommand::ListEvents).await
    }

    pub async fn list_sub_calendars(&self) -> CalendarResult<Vec<CalendarIdentifier>> {
        self.request(AccountCommand::ListSubCalendars).await?
    }

    pub async fn check_auth(&self) -> CalendarResult<AuthState> {
        self.request(AccountCommand::CheckAuth).await?
    }

    pub async fn submit_auth_code(&self, code: String) -> CalendarResult<AuthState> {
        self.request(|tx| AccountCommand::SubmitAuthCode(code, tx))
            .await?
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> CalendarResult<()> {
        let _ = self.command_tx.send(AccountCommand::Shutdown).await;
        Ok(())
    }
}

impl AccountActor {
    /// Create a new actor and return its handle.
    ///
    /// Accounts without an authorizer start out authorized.
    pub fn new(
        name: String,
        provider: Arc<dyn CalendarProvider>,
        authorizer: Option<Arc<dyn Authorizer>>,
        tree: Arc<dyn MaterializedTree>,
    ) -> (Self, AccountActorHandle, watch::Receiver<AuthState>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let initial = if authorizer.is_some() {
            AuthState::Unauthorized
        } else {
            AuthState::Authorized
        };
        let (auth_tx, auth_rx) = watch::channel(initial);

        let actor = Self {
            name,
            provider,
            authorizer,
            tree,
            auth_tx,
            command_rx,
        };

        (actor, AccountActorHandle { command_tx }, auth_rx)
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Account actor for {} started", self.name);

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                AccountCommand::Refresh(guard, response_tx) => {
                    let result = self.refresh().await;
                    drop(guard);
                    let _ = response_tx.send(result).await;
                }
                AccountCommand::CreateEvent(event, response_tx) => {
                    let result = self.create_event(event).await;
                    let _ = response_tx.send(result).await;
                }
                AccountCommand::DeleteEvent {
                    uid,
                    destroy_local_node,
                    response,
                } => {
                    let result = self.delete_event(&uid, destroy_local_node).await;
                    let _ = response.send(result).await;
                }
                AccountCommand::EditEvent {
                    uid,
                    replacement,
                    response,
                } => {
                    let result = self.edit_event(&uid, replacement).await;
                    let _ = response.send(result).await;
                }
                AccountCommand::ListEvents(response_tx) => {
                    let events = self.provider.list_events_or_empty().await;
                    let _ = response_tx.send(events).await;
                }
                AccountCommand::ListSubCalendars(response_tx) => {
                    let result = if self.provider.supports_multiple_calendars() {
                        self.provider.list_sub_calendars().await
                    } else {
                        Ok(Vec::new())
                    };
                    let _ = response_tx.send(result).await;
                }
                AccountCommand::CheckAuth(response_tx) => {
                    let result = self.check_auth().await;
                    let _ = response_tx.send(result).await;
                }
                AccountCommand::SubmitAuthCode(code, response_tx) => {
                    let result = self.submit_auth_code(&code).await;
                    let _ = response_tx.send(result).await;
                }
                AccountCommand::Shutdown => {
                    info!("Account actor for {} shutting down", self.name);
                    break;
                }
            }
        }

        info!("Account actor for {} shut down", self.name);
    }

    async fn refresh(&mut self) -> CalendarResult<ReconcileReport> {
        let result = reconcile(&self.name, self.provider.as_ref(), self.tree.as_ref()).await;
        if let Err(e) = &result {
            self.note_failure(e);
        }
        result
    }

    async fn create_event(&mut self, mut event: Event) -> CalendarResult<Event> {
        if let Err(e) = self.provider.create_event(&mut event).await {
            self.note_failure(&e);
            return Err(e);
        }
        if event.unique_id().is_empty() {
            return Err(other_error("Provider accepted the event without assigning an id"));
        }

        self.tree
            .create_entry(event.unique_id(), EntryFields::from(&event))
            .await?;
        info!("Created event {} in {}", event.unique_id(), self.name);
        Ok(event)
    }

    async fn delete_event(&mut self, uid: &str, destroy_local_node: bool) -> CalendarResult<()> {
        let calendar = self
            .tree
            .entry(uid)
            .await?
            .and_then(|fields| fields.calendar());

        match self.provider.delete_event(uid, calendar.as_ref()).await {
            Ok(()) => info!("Deleted event {} from {}", uid, self.name),
            Err(e) if e.is_not_found() => {
                info!("Event {} was already gone from {}", uid, self.name);
            }
            Err(e) => {
                self.note_failure(&e);
                return Err(e);
            }
        }

        if destroy_local_node {
            self.tree.remove_entry(uid).await?;
        }
        Ok(())
    }

    async fn edit_event(&mut self, uid: &str, mut replacement: Event) -> CalendarResult<Event> {
        let provider = Arc::clone(&self.provider);
        if let Err(e) = replace_event(provider.as_ref(), self.tree.as_ref(), uid, &mut replacement).await {
            self.note_failure(&e);
            return Err(e);
        }
        info!(
            "Replaced event {} with {} in {}",
            uid,
            replacement.unique_id(),
            self.name
        );
        Ok(replacement)
    }

    async fn check_auth(&mut self) -> CalendarResult<AuthState> {
        let Some(authorizer) = self.authorizer.clone() else {
            return Ok(self.auth_state());
        };

        match authorizer.begin().await {
            Ok(AuthStart::Ready) => self.transition(AuthEvent::CredentialsFound),
            Ok(AuthStart::NeedsCode { authorization_url }) => {
                let waiting = matches!(
                    &*self.auth_tx.borrow(),
                    AuthState::AwaitingCode { authorization_url: current } if *current == authorization_url
                );
                if !waiting {
                    warn!(
                        "Account {} needs authorization, visit {}",
                        self.name, authorization_url
                    );
                }
                self.transition(AuthEvent::CodeRequested { authorization_url });
            }
            Err(e) => {
                self.note_failure(&e);
                return Err(e);
            }
        }
        Ok(self.auth_state())
    }

    async fn submit_auth_code(&mut self, code: &str) -> CalendarResult<AuthState> {
        let Some(authorizer) = self.authorizer.clone() else {
            return Ok(self.auth_state());
        };

        authorizer.submit_code(code).await?;
        self.transition(AuthEvent::CodeAccepted);
        Ok(self.auth_state())
    }

    fn auth_state(&self) -> AuthState {
        self.auth_tx.borrow().clone()
    }

    fn transition(&self, event: AuthEvent) {
        let next = self.auth_state().on(event);
        if next != self.auth_state() {
            info!("Account {} is now {}", self.name, next);
        }
        self.auth_tx.send_replace(next);
    }

    // Rejected credentials stop the scheduler until the operator
    // re-authorizes; everything else is retried on the next tick.
    fn note_failure(&self, e: &crate::error::Error) {
        if e.is_auth() && self.authorizer.is_some() {
            error!("Credentials for {} were rejected: {}", self.name, e);
            self.transition(AuthEvent::CredentialsRejected);
        }
    }
}
