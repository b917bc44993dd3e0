use opsdesk_core::sandbox::{FnPtr, SelectOption};
use opsdesk_core::{
    materialize, Assistant, Bindings, ChatReply, ChatSession, Component, Followup,
    GatewayError, GeneratedComponentRecord, Registry, RenderError, SubmitError, UiNode,
};
use ratatui::widgets::ListState;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Components,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Records,
    Component,
}

/// What the text box is currently typing into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    Chat,
    Field { bind: String, label: String },
}

/// An interactive node of a rendered tree, in walk order.
#[derive(Debug, Clone)]
pub enum Control {
    Input {
        bind: String,
        label: String,
        value: String,
    },
    Select {
        bind: String,
        options: Vec<SelectOption>,
        value: String,
    },
    Button {
        disabled: bool,
        on_click: Option<FnPtr>,
    },
    Link {
        href: String,
    },
}

pub fn controls(tree: &UiNode) -> Vec<Control> {
    let mut found = Vec::new();
    tree.walk(&mut |node| match node {
        UiNode::Input {
            bind, label, value, ..
        } => found.push(Control::Input {
            bind: bind.clone(),
            label: label.clone(),
            value: value.clone(),
        }),
        UiNode::Select {
            bind,
            options,
            value,
            ..
        } => found.push(Control::Select {
            bind: bind.clone(),
            options: options.clone(),
            value: value.clone(),
        }),
        UiNode::Button {
            disabled, on_click, ..
        } => found.push(Control::Button {
            disabled: *disabled,
            on_click: on_click.clone(),
        }),
        UiNode::Link { href, .. } => found.push(Control::Link { href: href.clone() }),
        _ => {}
    });
    found
}

/// Result of pressing Enter on a control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Nothing,
    EditField {
        bind: String,
        label: String,
        current: String,
    },
    Navigate(String),
    Rendered,
}

/// A generated component opened in the right-hand pane.
pub struct ComponentView {
    pub record_id: i64,
    pub title: String,
    pub component: Option<Component>,
    pub tree: Option<UiNode>,
    pub error: Option<RenderError>,
    pub controls: Vec<Control>,
    pub selected: usize,
    pub scroll: u16,
    pub alerts: Vec<String>,
}

impl ComponentView {
    pub fn open(record: &GeneratedComponentRecord, bindings: &Bindings) -> Self {
        let mut view = Self {
            record_id: record.id,
            title: record.title.clone(),
            component: None,
            tree: None,
            error: None,
            controls: Vec::new(),
            selected: 0,
            scroll: 0,
            alerts: Vec::new(),
        };
        match materialize(&record.code, bindings) {
            Ok(component) => {
                view.component = Some(component);
                view.rerender();
            }
            Err(e) => view.error = Some(e),
        }
        view
    }

    fn apply(&mut self, result: Result<UiNode, RenderError>) {
        match result {
            Ok(tree) => {
                self.controls = controls(&tree);
                self.selected = self.selected.min(self.controls.len().saturating_sub(1));
                self.tree = Some(tree);
                self.error = None;
            }
            Err(e) => self.error = Some(e),
        }
        if let Some(component) = self.component.as_mut() {
            self.alerts.extend(component.take_alerts());
        }
    }

    pub fn rerender(&mut self) {
        if let Some(component) = self.component.as_mut() {
            let result = component.render();
            self.apply(result);
        }
    }

    pub fn set_input(&mut self, bind: &str, text: &str) {
        if let Some(component) = self.component.as_mut() {
            component.set_input(bind, text);
            let result = component.render();
            self.apply(result);
        }
    }

    pub fn select_next(&mut self) {
        if !self.controls.is_empty() {
            self.selected = (self.selected + 1) % self.controls.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.controls.is_empty() {
            self.selected = (self.selected + self.controls.len() - 1) % self.controls.len();
        }
    }

    pub fn activate(&mut self) -> Activation {
        let Some(control) = self.controls.get(self.selected).cloned() else {
            return Activation::Nothing;
        };
        match control {
            Control::Input { bind, label, value } => Activation::EditField {
                bind,
                label,
                current: value,
            },
            Control::Select {
                bind,
                options,
                value,
            } => {
                if options.is_empty() {
                    return Activation::Nothing;
                }
                // Enter cycles through the options
                let next = options
                    .iter()
                    .position(|o| o.value == value)
                    .map(|i| (i + 1) % options.len())
                    .unwrap_or(0);
                self.set_input(&bind, &options[next].value);
                Activation::Rendered
            }
            Control::Button { disabled: true, .. } | Control::Button { on_click: None, .. } => {
                Activation::Nothing
            }
            Control::Button {
                on_click: Some(handler),
                ..
            } => {
                if let Some(component) = self.component.as_mut() {
                    let result = component.dispatch(&handler);
                    self.apply(result);
                }
                Activation::Rendered
            }
            Control::Link { href } => Activation::Navigate(href),
        }
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub edit_target: EditTarget,

    // Chat state
    pub session: ChatSession,
    pub input: String,
    pub cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub reply_task: Option<JoinHandle<Result<ChatReply, GatewayError>>>,
    pub pending_redirect: Option<(i64, Instant)>,
    pub animation_frame: u8,

    // Generated components
    pub registry: Registry,
    pub records_state: ListState,
    pub view: Option<ComponentView>,
    pub status: Option<String>,

    // Pipeline
    pub assistant: Arc<Assistant>,
    pub bindings: Bindings,
    pub user_id: Option<i64>,
}

impl App {
    pub fn new(assistant: Arc<Assistant>, bindings: Bindings, user_id: Option<i64>) -> Self {
        Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Editing,
            focus: FocusPane::Records,
            edit_target: EditTarget::Chat,
            session: ChatSession::new(),
            input: String::new(),
            cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            reply_task: None,
            pending_redirect: None,
            animation_frame: 0,
            registry: Registry::new(),
            records_state: ListState::default(),
            view: None,
            status: None,
            assistant,
            bindings,
            user_id,
        }
    }

    pub fn model_label(&self) -> String {
        let gateway = self.assistant.gateway();
        format!("{}: {}", gateway.provider().display_name(), gateway.model())
    }

    /// Send the chat input, unless a request is already in flight.
    pub fn submit_input(&mut self) {
        match self.session.submit(&self.input) {
            Ok(message) => {
                self.input.clear();
                self.cursor = 0;
                self.status = None;

                let assistant = self.assistant.clone();
                let user_id = self.user_id;
                self.reply_task = Some(tokio::spawn(async move {
                    assistant.respond(&message, user_id).await
                }));
                self.scroll_chat_to_bottom();
            }
            Err(SubmitError::Busy) => {
                self.status = Some("Still generating the previous request...".to_string());
            }
            Err(SubmitError::Empty) => {}
        }
    }

    /// Collect the reply once the request task has finished.
    pub async fn poll_reply(&mut self) {
        let finished = self.reply_task.as_ref().is_some_and(|t| t.is_finished());
        if !finished {
            return;
        }
        let Some(task) = self.reply_task.take() else {
            return;
        };

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Reply task did not complete");
                Err(GatewayError::Transport {
                    provider: self.assistant.gateway().provider().as_str(),
                    message: e.to_string(),
                })
            }
        };

        if let Followup::ShowComponent { id, after } = self.session.resolve(outcome, &mut self.registry) {
            self.pending_redirect = Some((id, Instant::now() + after));
        }
        self.scroll_chat_to_bottom();
    }

    /// Tick animation frame and fire a due redirect.
    pub fn tick(&mut self) {
        if self.session.is_sending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Some((id, due)) = self.pending_redirect {
            if Instant::now() >= due {
                self.pending_redirect = None;
                self.open_component(id);
            }
        }
    }

    pub fn open_component(&mut self, id: i64) {
        if !self.registry.set_active(id) {
            return;
        }
        let Some(record) = self.registry.get(id) else {
            return;
        };
        info!(id, title = %record.title, "Opening generated component");

        self.view = Some(ComponentView::open(record, &self.bindings));
        self.records_state
            .select(self.registry.list().iter().position(|r| r.id == id));
        self.screen = Screen::Components;
        self.focus = FocusPane::Component;
        self.input_mode = InputMode::Normal;
        self.edit_target = EditTarget::Chat;
        self.drain_alerts();
    }

    pub fn open_selected_record(&mut self) {
        let id = self
            .records_state
            .selected()
            .and_then(|i| self.registry.list().get(i))
            .map(|r| r.id);
        if let Some(id) = id {
            self.open_component(id);
        }
    }

    pub fn delete_selected_record(&mut self) {
        let Some(index) = self.records_state.selected() else {
            return;
        };
        let Some(id) = self.registry.list().get(index).map(|r| r.id) else {
            return;
        };
        self.registry.remove(id);
        if self.view.as_ref().is_some_and(|v| v.record_id == id) {
            self.view = None;
        }
        let len = self.registry.len();
        self.records_state
            .select(if len == 0 { None } else { Some(index.min(len - 1)) });
    }

    pub fn clear_records(&mut self) {
        self.registry.clear();
        self.view = None;
        self.records_state.select(None);
    }

    pub fn records_down(&mut self) {
        let len = self.registry.len();
        if len > 0 {
            let next = self.records_state.selected().map_or(0, |i| (i + 1).min(len - 1));
            self.records_state.select(Some(next));
        }
    }

    pub fn records_up(&mut self) {
        if !self.registry.is_empty() {
            let prev = self.records_state.selected().map_or(0, |i| i.saturating_sub(1));
            self.records_state.select(Some(prev));
        }
    }

    /// Enter on the selected control of the open component.
    pub fn activate_control(&mut self) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        match view.activate() {
            Activation::EditField {
                bind,
                label,
                current,
            } => {
                self.cursor = current.chars().count();
                self.input = current;
                self.edit_target = EditTarget::Field { bind, label };
                self.input_mode = InputMode::Editing;
            }
            Activation::Navigate(href) => self.navigate(&href),
            Activation::Rendered | Activation::Nothing => {}
        }
        self.drain_alerts();
    }

    /// Links point at dashboard pages; the component list is the only page
    /// this front end has.
    fn navigate(&mut self, href: &str) {
        if href == "/generated" {
            self.focus = FocusPane::Records;
        } else {
            self.status = Some(format!("Open {} in the dashboard", href));
        }
    }

    /// Enter while typing into a component field.
    pub fn commit_field(&mut self) {
        if let EditTarget::Field { bind, .. } = &self.edit_target {
            if let Some(view) = self.view.as_mut() {
                view.set_input(bind, &self.input);
            }
        }
        self.cancel_field();
        self.drain_alerts();
    }

    pub fn cancel_field(&mut self) {
        self.input.clear();
        self.cursor = 0;
        self.edit_target = EditTarget::Chat;
        self.input_mode = InputMode::Normal;
    }

    fn drain_alerts(&mut self) {
        if let Some(view) = self.view.as_mut() {
            if !view.alerts.is_empty() {
                self.status = Some(view.alerts.drain(..).collect::<Vec<_>>().join(" | "));
            }
        }
    }

    pub fn redirect_pending(&self) -> bool {
        self.pending_redirect.is_some()
    }

    /// Scroll chat to bottom so the latest message is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.session.messages() {
            total_lines += 1; // Role line
            for line in msg.content.lines() {
                let char_count = line.chars().count();
                total_lines += ((char_count / wrap_width) + 1) as u16;
            }
            total_lines += 1; // Blank separator
        }
        if self.session.is_sending() {
            total_lines += 2;
        }

        self.chat_scroll = total_lines.saturating_sub(self.chat_height);
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }
}
