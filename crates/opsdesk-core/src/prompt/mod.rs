//! System and user prompts for component generation.

pub mod examples;

pub use examples::{Example, EXAMPLES};

use crate::ai::combine_prompts;
use crate::api::NAMESPACES;
use crate::context::RequestContext;
use crate::sandbox::preflight::FORBIDDEN;
use crate::schema::SchemaContext;

const OUTPUT_CONTRACT: &str = r#"YOU MUST ALWAYS respond with valid JSON in this EXACT format (no markdown, no code blocks, no text outside JSON):

{
  "type": "ui_component",
  "title": "Component Title",
  "description": "Brief description",
  "code": "fn ComponentName() { /* component script using the ui module */ }",
  "explanation": "Brief explanation"
}"#;

const LANGUAGE: &str = r#"COMPONENT LANGUAGE:
- "code" is a Rhai script that defines ONE function taking no arguments; it returns the UI tree
- Strings use "double quotes" or `backticks` with ${interpolation}; maps are #{ key: value }; closures are |x| expr or || { ... }
- UI primitives: ui::card(title, [children]), ui::el(tag, #{ props }, [children]), ui::row([children]), ui::heading(text), ui::text(text),
  ui::input(#{ label, bind, kind, placeholder, value }), ui::select(#{ label, bind, options, value }),
  ui::button(#{ label, disabled, on_click: || { ... } }), ui::table([columns], [[cells]])
- Select options are a list of #{ value, label } maps or plain strings
- Inputs and selects are bound to state by the "bind" key; read what the user entered with use_state(bind, default)
- State hooks: use_state(key, initial) returns the current value, set_state(key, value) updates it
- use_effect(key, || { ... }) runs once after the first render (load lists here); alert(message) shows a message
- API calls are synchronous and return #{ data: ... }; they throw on failure, so wrap them in try { } catch (err) { }
- Navigation: Link::to(href, label)"#;

const UPDATE_FORM_RULES: &str = r#"CRITICAL RULES FOR UPDATE/EDIT FORMS:
- NEVER use text input for ID/entity selection - ALWAYS use a ui::select dropdown
- ALWAYS fetch the list in use_effect when the component mounts:
  * For products: inventoryAPI::getProducts()
  * For orders: operationsAPI::getOrders()
  * For customers: operationsAPI::getCustomers()
  * For shipments: logisticsAPI::getShipments()
  * For warehouses: logisticsAPI::getWarehouses()
  * For campaigns: marketingAPI::getCampaigns()
  * For users: usersAPI::getUsers()
- Show a loading state while fetching the list
- Display items in the dropdown with format: "Item Name (ID: 123)"
- Bind the selected ID to state (e.g. selected_product_id, selected_order_id)
- Use the selected ID in the update call (e.g. inventoryAPI::updateProduct(id, data))"#;

const MULTIPLE_OPERATIONS_RULES: &str = r#"MULTIPLE OPERATIONS IN ONE COMPONENT:
- If the user requests multiple operations (e.g. "update warehouse capacity and product low stock threshold"), create ONE component with:
  * One section (ui::card) per operation, switched with tab buttons that set an "active_tab" state
  * OR a single form with fields for all operations
  * Use tabs if operations are logically separate, a single form if they are related
- Each tab/section has its own dropdown selection and fields"#;

const FILTERING_RULES: &str = r#"CONDITIONAL FILTERING AND EDITING:
- When the user asks to change items that match a condition (e.g. "change cost of products that are low on stock", "update status of pending orders"):
  1. FIRST: Fetch filtered data using API query parameters:
     * For low stock products: inventoryAPI::getProducts(#{ low_stock: "true" })
     * For pending orders: operationsAPI::getOrders(#{ status: "pending" })
     * For specific categories: inventoryAPI::getProducts(#{ category: "Electronics" })
  2. Display the filtered list with ui::table showing the relevant fields
  3. For each item, provide an inline editor: a bound ui::input plus an "Update" ui::button
  4. When the user edits, call the update API with the item's ID: inventoryAPI::updateProduct(item.id, #{ cost: new_cost })
  5. After a successful update, refresh the filtered list"#;

const GENERAL_RULES: &str = r#"GENERAL RULES:
1. ALWAYS return valid JSON only - start with { and end with } (NOT an array [])
2. Build the UI with the ui module (NOT HTML, NOT JSX, NOT React)
3. Use hooks: use_state, set_state, use_effect
4. Use APIs: {apis}
5. Follow patterns from schema
6. Handle loading states (both for fetching lists and for submitting)
7. Use exact field names from schema
8. For update forms: Fetch list -> Show dropdown -> User selects -> Update with selected ID
9. If user context is provided, ALWAYS add a quick action suggestions section at the bottom based on the user's activity patterns
10. Return ONLY ONE JSON object, not an array - even if handling multiple operations, wrap everything in a single component
11. CRITICAL: ALWAYS ensure try blocks are COMPLETE - every try MUST have a matching catch block. Never leave try blocks incomplete.
12. CRITICAL: Ensure all function bodies, if statements, and code blocks are properly closed with matching braces
13. Never use {forbidden}; only the bindings above exist"#;

const CLOSING: &str = "RESPOND WITH JSON ONLY - NO MARKDOWN, NO CODE BLOCKS, NO TEXT OUTSIDE JSON - RETURN A SINGLE OBJECT {}, NOT AN ARRAY []:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

impl Prompt {
    /// The single text sent to the gateway.
    pub fn combined(&self) -> String {
        combine_prompts(&self.system_prompt, &self.user_prompt)
    }
}

fn user_context_section(context: &RequestContext) -> String {
    format!(
        "CURRENT USER CONTEXT:\n{}\n\n\
ANALYZE USER ACTIVITY TO SUGGEST NEXT ACTIONS:\n\
- Look at the modules the user visits most and the kinds of actions they take\n\
- Identify patterns (e.g. if the user often views products after inventory, suggest product-related actions)\n\
- Check the favorite modules from preferences to see what the user prefers\n\
- Based on these patterns, suggest the 2-4 most likely next pages: {}\n\
- Add them at the bottom of the component as a ui::card(\"Quick Actions\", [ui::row([Link::to(href, label), ...])])\n\
- Link is already available, do NOT import or require it",
        context.digest(),
        crate::schema::PAGES
            .iter()
            .map(|(href, _)| *href)
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Assemble the prompts for one request. Never fails.
pub fn build(user_message: &str, schema: &SchemaContext, context: Option<&RequestContext>) -> Prompt {
    let mut sections = vec![
        "You are a UI component generator for an operations admin console. Your ONLY job is to generate UI components as JSON.".to_string(),
        format!("Website schema:\n{}", schema.to_pretty()),
    ];

    if let Some(context) = context.filter(|c| !c.is_empty()) {
        sections.push(user_context_section(context));
    }

    sections.push(OUTPUT_CONTRACT.to_string());
    sections.push(LANGUAGE.to_string());

    for (i, example) in EXAMPLES.iter().enumerate() {
        let envelope = serde_json::to_string_pretty(&example.envelope()).unwrap_or_default();
        sections.push(format!("EXAMPLE {} - {}:\n{}", i + 1, example.heading, envelope));
    }

    let apis = NAMESPACES.iter().map(|ns| ns.name).collect::<Vec<_>>().join(", ");
    sections.push(UPDATE_FORM_RULES.to_string());
    sections.push(MULTIPLE_OPERATIONS_RULES.to_string());
    sections.push(FILTERING_RULES.to_string());
    sections.push(
        GENERAL_RULES
            .replace("{apis}", &apis)
            .replace("{forbidden}", &FORBIDDEN.join(", ")),
    );
    sections.push(CLOSING.to_string());

    Prompt {
        system_prompt: sections.join("\n\n"),
        user_prompt: format!(
            "Generate a UI component based on this request: {}\n\n\
CRITICAL: Respond with ONLY valid JSON in the exact format shown in the examples. Start with {{ and end with }}. No markdown, no code blocks, no explanations outside JSON.",
            user_message
        ),
    }
}
