use crate::api::ApiClient;
use crate::auth::{inline_message, LoginForm, RegisterForm, Session, LOGIN_FALLBACK, REGISTER_FALLBACK};
use crate::dashboard::{Dashboard, Mutation};
use crate::error::Result;
use crate::models::TaskDraft;
use crate::optimistic::Ticket;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::widgets::ListState;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Login,
    Register,
    Dashboard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Adding,
    Editing,
    Searching,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveInput {
    Title,
    Description,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormField {
    Name,
    Email,
    Password,
}

/// Completions delivered back to the UI loop
#[derive(Debug)]
pub enum AppEvent {
    Settled(Ticket, Result<()>),
}

pub struct App {
    pub screen: Screen,
    pub dashboard: Dashboard<ApiClient>,
    session: Session,
    pub state: ListState,
    pub input_mode: InputMode,
    pub active_input: ActiveInput,
    pub login_form: LoginForm,
    pub register_form: RegisterForm,
    pub form_field: FormField,
    pub form_error: Option<String>,
    pub needs_load: bool,
    events_tx: UnboundedSender<AppEvent>,
    events_rx: UnboundedReceiver<AppEvent>,
}

impl App {
    /// Opens the dashboard when a stored token exists, otherwise the login
    /// screen.
    pub fn new(mut client: ApiClient, session: Session) -> App {
        let authenticated = match session.resume(&mut client) {
            Ok(authenticated) => authenticated,
            Err(err) => {
                warn!(error = %err, "could not read stored session");
                false
            }
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        App {
            screen: if authenticated {
                Screen::Dashboard
            } else {
                Screen::Login
            },
            dashboard: Dashboard::new(client),
            session,
            state: ListState::default(),
            input_mode: InputMode::Normal,
            active_input: ActiveInput::Title,
            login_form: LoginForm::default(),
            register_form: RegisterForm::default(),
            form_field: FormField::Email,
            form_error: None,
            needs_load: authenticated,
            events_tx,
            events_rx,
        }
    }

    pub async fn refresh_tasks(&mut self) {
        self.needs_load = false;
        if let Err(err) = self.dashboard.load().await {
            if err.is_auth_error() {
                warn!("stored session rejected, returning to login");
                self.logout();
            } else {
                warn!(error = %err, "error fetching tasks");
            }
        }
        self.clamp_selection();
    }

    pub fn logout(&mut self) {
        if let Err(err) = self.session.logout(self.dashboard.api_mut()) {
            warn!(error = %err, "error clearing session");
        }
        self.dashboard.reset();
        self.screen = Screen::Login;
        self.input_mode = InputMode::Normal;
        self.login_form = LoginForm::default();
        self.register_form = RegisterForm::default();
        self.form_field = FormField::Email;
        self.form_error = None;
        self.needs_load = false;
        self.state.select(None);
    }

    fn open_dashboard(&mut self) {
        self.screen = Screen::Dashboard;
        self.input_mode = InputMode::Normal;
        self.form_error = None;
        self.login_form = LoginForm::default();
        self.register_form = RegisterForm::default();
        self.needs_load = true;
    }

    pub fn selected_task_id(&self) -> Option<String> {
        let selected = self.state.selected()?;
        self.dashboard
            .visible_tasks()
            .get(selected)
            .map(|task| task.id.clone())
    }

    pub fn clamp_selection(&mut self) {
        let len = self.dashboard.visible_tasks().len();
        let selected = match self.state.selected() {
            _ if len == 0 => None,
            Some(i) if i >= len => Some(len - 1),
            Some(i) => Some(i),
            None => Some(0),
        };
        self.state.select(selected);
    }

    pub fn next(&mut self) {
        let len = self.dashboard.visible_tasks().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.dashboard.visible_tasks().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Applies a mutation locally and sends its request in the background.
    pub fn dispatch(&mut self, mutation: Mutation) {
        let Some(pending) = self.dashboard.begin(mutation) else {
            return;
        };
        let api = self.dashboard.api().clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = pending.send(&api).await;
            // the receiver only disappears when the app is shutting down
            let _ = tx.send(AppEvent::Settled(pending.ticket, outcome));
        });
        self.clamp_selection();
    }

    /// Settles every completion that has arrived since the last frame.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                AppEvent::Settled(ticket, outcome) => {
                    // issued before a logout or reload; a 401 here says
                    // nothing about the current session
                    if !self.dashboard.is_current(&ticket) {
                        continue;
                    }
                    let auth_failed = matches!(&outcome, Err(err) if err.is_auth_error());
                    self.dashboard.settle(ticket, &outcome);
                    if auth_failed && self.screen == Screen::Dashboard {
                        self.logout();
                    }
                }
            }
        }
        self.clamp_selection();
    }

    /// Returns true when the user asked to quit.
    pub async fn handle_input(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        match self.screen {
            Screen::Login => self.handle_login_key(key).await,
            Screen::Register => {
                self.handle_register_key(key).await;
                false
            }
            Screen::Dashboard => self.handle_dashboard_key(key).await,
        }
    }

    async fn handle_login_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => return true,
            KeyCode::F(2) => {
                self.screen = Screen::Register;
                self.form_field = FormField::Name;
                self.form_error = None;
            }
            KeyCode::Tab | KeyCode::Down | KeyCode::Up => {
                self.form_field = match self.form_field {
                    FormField::Email => FormField::Password,
                    _ => FormField::Email,
                };
            }
            KeyCode::Enter => {
                self.form_error = None;
                let form = self.login_form.clone();
                match self.session.login(self.dashboard.api_mut(), &form).await {
                    Ok(()) => self.open_dashboard(),
                    Err(err) => {
                        warn!(error = %err, "login failed");
                        self.form_error = Some(inline_message(&err, LOGIN_FALLBACK));
                    }
                }
            }
            KeyCode::Char(c) => match self.form_field {
                FormField::Password => self.login_form.password.push(c),
                _ => self.login_form.email.push(c),
            },
            KeyCode::Backspace => {
                match self.form_field {
                    FormField::Password => self.login_form.password.pop(),
                    _ => self.login_form.email.pop(),
                };
            }
            _ => {}
        }
        false
    }

    async fn handle_register_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.screen = Screen::Login;
                self.form_field = FormField::Email;
                self.form_error = None;
            }
            KeyCode::Tab | KeyCode::Down => {
                self.form_field = match self.form_field {
                    FormField::Name => FormField::Email,
                    FormField::Email => FormField::Password,
                    FormField::Password => FormField::Name,
                };
            }
            KeyCode::Up => {
                self.form_field = match self.form_field {
                    FormField::Name => FormField::Password,
                    FormField::Email => FormField::Name,
                    FormField::Password => FormField::Email,
                };
            }
            KeyCode::Enter => {
                self.form_error = None;
                let form = self.register_form.clone();
                match self.session.register(self.dashboard.api_mut(), &form).await {
                    Ok(()) => self.open_dashboard(),
                    Err(err) => {
                        warn!(error = %err, "registration failed");
                        self.form_error = Some(inline_message(&err, REGISTER_FALLBACK));
                    }
                }
            }
            KeyCode::Char(c) => self.register_field_mut().push(c),
            KeyCode::Backspace => {
                self.register_field_mut().pop();
            }
            _ => {}
        }
    }

    fn register_field_mut(&mut self) -> &mut String {
        match self.form_field {
            FormField::Name => &mut self.register_form.name,
            FormField::Email => &mut self.register_form.email,
            FormField::Password => &mut self.register_form.password,
        }
    }

    async fn handle_dashboard_key(&mut self, key: KeyEvent) -> bool {
        match self.input_mode {
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Char('j') | KeyCode::Down => self.next(),
                KeyCode::Char('k') | KeyCode::Up => self.previous(),
                KeyCode::Char('r') => self.refresh_tasks().await,
                KeyCode::Char('f') => {
                    self.dashboard.filter = self.dashboard.filter.next();
                    self.clamp_selection();
                }
                KeyCode::Char('/') => self.input_mode = InputMode::Searching,
                KeyCode::Char('a') => {
                    self.input_mode = InputMode::Adding;
                    self.active_input = ActiveInput::Title;
                }
                KeyCode::Char(' ') | KeyCode::Char('x') => {
                    if let Some(task_id) = self.selected_task_id() {
                        self.dispatch(Mutation::Toggle(task_id));
                    }
                }
                KeyCode::Char('e') | KeyCode::Enter => {
                    if let Some(task_id) = self.selected_task_id() {
                        if self.dashboard.begin_edit(&task_id) {
                            self.input_mode = InputMode::Editing;
                            self.active_input = ActiveInput::Title;
                        }
                    }
                }
                KeyCode::Char('d') | KeyCode::Delete => {
                    if let Some(task_id) = self.selected_task_id() {
                        self.dispatch(Mutation::Delete(task_id));
                    }
                }
                KeyCode::Char('L') => self.logout(),
                _ => {}
            },

            InputMode::Adding => match key.code {
                KeyCode::Enter => {
                    match self.dashboard.add().await {
                        Ok(true) => {
                            self.input_mode = InputMode::Normal;
                            self.state.select(Some(0));
                        }
                        // blank title: keep the form open
                        Ok(false) => {}
                        Err(err) => warn!(error = %err, "error creating task"),
                    }
                    self.clamp_selection();
                }
                KeyCode::Esc => self.input_mode = InputMode::Normal,
                _ => edit_draft(&mut self.dashboard.new_task, &mut self.active_input, key),
            },

            InputMode::Editing => match key.code {
                KeyCode::Enter => {
                    self.dispatch(Mutation::SaveEdit);
                    if self.dashboard.editing_id().is_none() {
                        self.input_mode = InputMode::Normal;
                    }
                }
                KeyCode::Esc => {
                    self.dashboard.cancel_edit();
                    self.input_mode = InputMode::Normal;
                }
                _ => edit_draft(&mut self.dashboard.edit_draft, &mut self.active_input, key),
            },

            InputMode::Searching => {
                match key.code {
                    KeyCode::Enter => self.input_mode = InputMode::Normal,
                    KeyCode::Esc => {
                        self.dashboard.search.clear();
                        self.input_mode = InputMode::Normal;
                    }
                    KeyCode::Char(c) => self.dashboard.search.push(c),
                    KeyCode::Backspace => {
                        self.dashboard.search.pop();
                    }
                    _ => {}
                }
                self.clamp_selection();
            }
        }
        false
    }
}

fn edit_draft(draft: &mut TaskDraft, active_input: &mut ActiveInput, key: KeyEvent) {
    match key.code {
        KeyCode::Tab => {
            *active_input = match active_input {
                ActiveInput::Title => ActiveInput::Description,
                ActiveInput::Description => ActiveInput::Title,
            };
        }
        KeyCode::Char(c) => match active_input {
            ActiveInput::Title => draft.title.push(c),
            ActiveInput::Description => draft.description.push(c),
        },
        KeyCode::Backspace => match active_input {
            ActiveInput::Title => {
                draft.title.pop();
            }
            ActiveInput::Description => {
                draft.description.pop();
            }
        },
        _ => {}
    }
}
