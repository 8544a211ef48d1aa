use thiserror::Error;

use crate::connection::{ConnectionError, StoreBackend, StoreError};
use crate::connections::Connection;
use crate::session::{BrowserSession, RenderSnapshot, SessionError};

pub const DEFAULT_TAB_NAME: &str = "New Tab";

#[derive(Debug, Error)]
pub enum TabError {
    #[error("no tab is open")]
    NoActiveTab,
    #[error("tab {index} does not exist ({len} open)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("tab is not connected")]
    NotConnected,
    #[error("tab is already connected to `{connection}`")]
    AlreadyConnected { connection: String },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("tab closed but its connection did not shut down cleanly: {0}")]
    Disconnect(#[source] StoreError),
}

#[derive(Debug)]
pub struct Tab<B: StoreBackend> {
    name: String,
    session: Option<BrowserSession<B>>,
}

impl<B: StoreBackend> Tab<B> {
    fn new() -> Self {
        Self {
            name: DEFAULT_TAB_NAME.to_string(),
            session: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn session(&self) -> Option<&BrowserSession<B>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut BrowserSession<B>> {
        self.session.as_mut()
    }
}

#[derive(Debug)]
pub struct TabManager<B: StoreBackend + Clone> {
    backend: B,
    tabs: Vec<Tab<B>>,
    active: Option<usize>,
}

impl<B: StoreBackend + Clone> TabManager<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            tabs: Vec::new(),
            active: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    #[must_use]
    pub fn tabs(&self) -> &[Tab<B>] {
        &self.tabs
    }

    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    #[must_use]
    pub fn active(&self) -> Option<&Tab<B>> {
        self.tabs.get(self.active?)
    }

    pub fn active_mut(&mut self) -> Option<&mut Tab<B>> {
        self.tabs.get_mut(self.active?)
    }

    pub fn new_tab(&mut self) -> usize {
        self.tabs.push(Tab::new());
        let index = self.tabs.len() - 1;
        self.active = Some(index);
        tracing::debug!(index, "opened tab");
        index
    }

    pub fn select_tab(&mut self, index: usize) -> Result<(), TabError> {
        self.check_index(index)?;
        self.active = Some(index);
        Ok(())
    }

    pub fn next_tab(&mut self) -> Result<usize, TabError> {
        let active = self.active.ok_or(TabError::NoActiveTab)?;
        let next = (active + 1) % self.tabs.len();
        self.active = Some(next);
        Ok(next)
    }

    pub fn prev_tab(&mut self) -> Result<usize, TabError> {
        let active = self.active.ok_or(TabError::NoActiveTab)?;
        let prev = (active + self.tabs.len() - 1) % self.tabs.len();
        self.active = Some(prev);
        Ok(prev)
    }

    /// Removes a tab and closes its connection. The tab is gone even when the
    /// connection fails to shut down.
    pub async fn close_tab(&mut self, index: usize) -> Result<(), TabError> {
        self.check_index(index)?;
        let tab = self.tabs.remove(index);

        self.active = match self.active {
            _ if self.tabs.is_empty() => None,
            Some(active) if active > index => Some(active - 1),
            Some(active) => Some(active.min(self.tabs.len() - 1)),
            None => Some(0),
        };
        tracing::debug!(index, remaining = self.tabs.len(), "closed tab");

        if let Some(session) = tab.session {
            session.close().await.map_err(TabError::Disconnect)?;
        }
        Ok(())
    }

    pub async fn connect_active(&mut self, connection: Connection) -> Result<(), TabError> {
        let backend = self.backend.clone();
        let tab = self.active_mut().ok_or(TabError::NoActiveTab)?;
        if let Some(session) = &tab.session {
            return Err(TabError::AlreadyConnected {
                connection: session.connection().name.clone(),
            });
        }

        let session = BrowserSession::open(backend, connection).await?;
        tab.name = session.connection().display_name().to_string();
        tab.session = Some(session);
        Ok(())
    }

    pub async fn select_table(&mut self, table: &str) -> Result<RenderSnapshot<'_>, TabError> {
        let tab = self.active_mut().ok_or(TabError::NoActiveTab)?;
        let session = tab.session.as_mut().ok_or(TabError::NotConnected)?;
        session.select_table(table).await?;
        tab.name = table.to_string();
        Ok(session.snapshot())
    }

    pub fn active_session_mut(&mut self) -> Result<&mut BrowserSession<B>, TabError> {
        self.active_mut()
            .ok_or(TabError::NoActiveTab)?
            .session
            .as_mut()
            .ok_or(TabError::NotConnected)
    }

    fn check_index(&self, index: usize) -> Result<(), TabError> {
        if index < self.tabs.len() {
            Ok(())
        } else {
            Err(TabError::IndexOutOfRange {
                index,
                len: self.tabs.len(),
            })
        }
    }
}
