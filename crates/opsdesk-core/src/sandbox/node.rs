//! The UI tree a component renders to, and the `ui`/`Link` script modules
//! that build it.

use rhai::{Array, Dynamic, FnPtr, ImmutableString, Map, Module};
use std::sync::{Arc, Mutex};

use super::hooks::{lock, HookState};

/// What a component renders. Front ends decide how each variant looks.
#[derive(Debug, Clone)]
pub enum UiNode {
    Element {
        tag: String,
        props: Vec<(String, String)>,
        children: Vec<UiNode>,
    },
    Text(String),
    Input {
        label: String,
        bind: String,
        kind: String,
        placeholder: String,
        value: String,
    },
    Select {
        label: String,
        bind: String,
        options: Vec<SelectOption>,
        value: String,
    },
    Button {
        label: String,
        disabled: bool,
        on_click: Option<FnPtr>,
    },
    Link {
        href: String,
        label: String,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl UiNode {
    /// Anything a script returns becomes a node: nodes pass through, arrays
    /// become fragments, unit renders nothing, everything else is text.
    pub fn from_dynamic(value: Dynamic) -> UiNode {
        let value = value.flatten();
        if value.is::<UiNode>() {
            return value.cast::<UiNode>();
        }
        if value.is_unit() {
            return UiNode::fragment(Vec::new());
        }
        if value.is_array() {
            let items = value.cast::<Array>();
            return UiNode::fragment(items.into_iter().map(UiNode::from_dynamic).collect());
        }
        UiNode::Text(value.to_string())
    }

    pub fn fragment(children: Vec<UiNode>) -> UiNode {
        UiNode::Element {
            tag: "fragment".to_string(),
            props: Vec::new(),
            children,
        }
    }

    pub fn children(&self) -> &[UiNode] {
        match self {
            UiNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    /// Depth-first walk over this node and everything under it.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a UiNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Plain text of the tree, one line per text-bearing node.
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        self.walk(&mut |node| match node {
            UiNode::Text(text) => lines.push(text.clone()),
            UiNode::Element { props, .. } => {
                if let Some((_, title)) = props.iter().find(|(k, _)| k == "title") {
                    lines.push(title.clone());
                }
            }
            UiNode::Input { label, value, .. } => lines.push(format!("{}: {}", label, value)),
            UiNode::Select { label, value, .. } => lines.push(format!("{}: {}", label, value)),
            UiNode::Button { label, .. } => lines.push(format!("[{}]", label)),
            UiNode::Link { href, label } => lines.push(format!("{} -> {}", label, href)),
            UiNode::Table { columns, rows } => {
                lines.push(columns.join(" | "));
                for row in rows {
                    lines.push(row.join(" | "));
                }
            }
        });
        lines.join("\n")
    }
}

fn prop(props: &Map, key: &str) -> Option<Dynamic> {
    props.get(key).map(|v| v.clone().flatten())
}

fn prop_string(props: &Map, key: &str) -> String {
    match prop(props, key) {
        Some(v) if !v.is_unit() => v.to_string(),
        _ => String::new(),
    }
}

fn prop_bool(props: &Map, key: &str) -> bool {
    prop(props, key)
        .and_then(|v| v.as_bool().ok())
        .unwrap_or(false)
}

fn children_of(items: Array) -> Vec<UiNode> {
    items.into_iter().map(UiNode::from_dynamic).collect()
}

fn string_props(props: &Map) -> Vec<(String, String)> {
    props
        .iter()
        .filter(|(_, v)| !v.is::<FnPtr>())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn select_options(options: Option<Dynamic>) -> Vec<SelectOption> {
    let Some(options) = options.filter(|o| o.is_array()) else {
        return Vec::new();
    };
    options
        .cast::<Array>()
        .into_iter()
        .map(|item| {
            let item = item.flatten();
            if item.is_map() {
                let map = item.cast::<Map>();
                let value = prop_string(&map, "value");
                let label = match prop_string(&map, "label") {
                    l if l.is_empty() => value.clone(),
                    l => l,
                };
                SelectOption { value, label }
            } else {
                let value = item.to_string();
                SelectOption {
                    label: value.clone(),
                    value,
                }
            }
        })
        .collect()
}

fn current_value(hooks: &Mutex<HookState>, bind: &str, props: &Map) -> String {
    match lock(hooks).get(bind) {
        Some(v) if !v.is_unit() => v.to_string(),
        _ => prop_string(props, "value"),
    }
}

fn node(n: UiNode) -> Dynamic {
    Dynamic::from(n)
}

/// The `ui` namespace. Inputs and selects read their bound state so the tree
/// reflects what the user typed.
pub fn ui_module(hooks: Arc<Mutex<HookState>>) -> Module {
    let mut module = Module::new();

    module.set_native_fn("el", |tag: ImmutableString, props: Map, children: Array| {
        Ok(node(UiNode::Element {
            tag: tag.to_string(),
            props: string_props(&props),
            children: children_of(children),
        }))
    });
    module.set_native_fn("el", |tag: ImmutableString, children: Array| {
        Ok(node(UiNode::Element {
            tag: tag.to_string(),
            props: Vec::new(),
            children: children_of(children),
        }))
    });
    module.set_native_fn("text", |value: Dynamic| {
        Ok(node(UiNode::Text(value.flatten().to_string())))
    });
    module.set_native_fn("heading", |value: Dynamic| {
        Ok(node(UiNode::Element {
            tag: "h3".to_string(),
            props: Vec::new(),
            children: vec![UiNode::Text(value.flatten().to_string())],
        }))
    });
    module.set_native_fn("card", |title: ImmutableString, children: Array| {
        Ok(node(UiNode::Element {
            tag: "card".to_string(),
            props: vec![("title".to_string(), title.to_string())],
            children: children_of(children),
        }))
    });
    module.set_native_fn("row", |children: Array| {
        Ok(node(UiNode::Element {
            tag: "row".to_string(),
            props: Vec::new(),
            children: children_of(children),
        }))
    });

    let input_hooks = hooks.clone();
    module.set_native_fn("input", move |props: Map| {
        let bind = prop_string(&props, "bind");
        let kind = match prop_string(&props, "kind") {
            k if k.is_empty() => "text".to_string(),
            k => k,
        };
        Ok(node(UiNode::Input {
            label: prop_string(&props, "label"),
            value: current_value(&input_hooks, &bind, &props),
            placeholder: prop_string(&props, "placeholder"),
            kind,
            bind,
        }))
    });

    let select_hooks = hooks;
    module.set_native_fn("select", move |props: Map| {
        let bind = prop_string(&props, "bind");
        Ok(node(UiNode::Select {
            label: prop_string(&props, "label"),
            options: select_options(prop(&props, "options")),
            value: current_value(&select_hooks, &bind, &props),
            bind,
        }))
    });

    module.set_native_fn("button", |props: Map| {
        Ok(node(UiNode::Button {
            label: prop_string(&props, "label"),
            disabled: prop_bool(&props, "disabled"),
            on_click: prop(&props, "on_click").and_then(|v| v.try_cast::<FnPtr>()),
        }))
    });

    module.set_native_fn("table", |columns: Array, rows: Array| {
        let columns = columns.into_iter().map(|c| c.flatten().to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|row| {
                let row = row.flatten();
                if row.is_array() {
                    row.cast::<Array>()
                        .into_iter()
                        .map(|cell| cell.flatten().to_string())
                        .collect()
                } else {
                    vec![row.to_string()]
                }
            })
            .collect();
        Ok(node(UiNode::Table { columns, rows }))
    });

    module
}

/// `Link::to(href, label)`, the only navigation primitive.
pub fn link_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("to", |href: ImmutableString, label: Dynamic| {
        Ok(node(UiNode::Link {
            href: href.to_string(),
            label: label.flatten().to_string(),
        }))
    });
    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::INT;

    #[test]
    fn test_from_dynamic_shapes() {
        let array: Array = vec![Dynamic::from("a".to_string()), Dynamic::from(2 as INT)];
        match UiNode::from_dynamic(Dynamic::from(array)) {
            UiNode::Element { tag, children, .. } => {
                assert_eq!(tag, "fragment");
                assert!(matches!(&children[1], UiNode::Text(t) if t == "2"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(UiNode::from_dynamic(Dynamic::UNIT).children().is_empty());
    }

    #[test]
    fn test_select_options_accept_maps_and_strings() {
        let mut option = Map::new();
        option.insert("value".into(), Dynamic::from(7 as INT));
        option.insert("label".into(), Dynamic::from("Widget (ID: 7)".to_string()));
        let options: Array = vec![Dynamic::from(option), Dynamic::from("pending".to_string())];

        let parsed = select_options(Some(Dynamic::from(options)));
        assert_eq!(
            parsed,
            vec![
                SelectOption {
                    value: "7".into(),
                    label: "Widget (ID: 7)".into()
                },
                SelectOption {
                    value: "pending".into(),
                    label: "pending".into()
                },
            ]
        );
    }

    #[test]
    fn test_plain_text() {
        let tree = UiNode::Element {
            tag: "card".into(),
            props: vec![("title".into(), "Orders".into())],
            children: vec![
                UiNode::Text("3 pending".into()),
                UiNode::Link {
                    href: "/logistics".into(),
                    label: "Shipments".into(),
                },
            ],
        };
        assert_eq!(tree.plain_text(), "Orders\n3 pending\nShipments -> /logistics");
    }
}
