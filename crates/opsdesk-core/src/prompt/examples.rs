//! Worked examples embedded in the system prompt.

use serde_json::{json, Value};

pub struct Example {
    pub heading: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub code: &'static str,
    pub explanation: &'static str,
}

impl Example {
    pub fn envelope(&self) -> Value {
        json!({
            "type": "ui_component",
            "title": self.title,
            "description": self.description,
            "code": self.code,
            "explanation": self.explanation,
        })
    }
}

pub(crate) const EDIT_STOCK_THRESHOLD: &str = r#"fn EditProductStock() {
    let products = use_state("products", []);
    let fetching = use_state("fetching", true);
    let saving = use_state("saving", false);
    use_effect("load_products", || {
        try {
            let res = inventoryAPI::getProducts(#{ limit: 100 });
            set_state("products", res.data);
        } catch (err) {
            alert(`Error loading products: ${err}`);
        }
        set_state("fetching", false);
    });
    if fetching {
        return ui::card("Edit Product Stock Threshold", [ui::text("Loading products...")]);
    }
    let options = products.map(|p| #{ value: p.id, label: `${p.name} (ID: ${p.id})` });
    ui::card("Edit Product Stock Threshold", [
        ui::select(#{ label: "Select Product", bind: "selected_product_id", options: options }),
        ui::input(#{ label: "Low Stock Threshold", bind: "threshold", kind: "number", value: use_state("threshold", 0) }),
        ui::button(#{ label: if saving { "Saving..." } else { "Save" }, disabled: saving, on_click: || {
            let id = use_state("selected_product_id", "");
            if id == "" {
                alert("Please select a product");
                return;
            }
            set_state("saving", true);
            try {
                inventoryAPI::updateProduct(id, #{ low_stock_threshold: use_state("threshold", 0) });
                alert("Updated successfully");
            } catch (err) {
                alert(`Error: ${err}`);
            }
            set_state("saving", false);
        }})
    ])
}"#;

pub(crate) const UPDATE_ORDER_STATUS: &str = r#"fn UpdateOrderStatus() {
    let orders = use_state("orders", []);
    let fetching = use_state("fetching", true);
    let saving = use_state("saving", false);
    use_effect("load_orders", || {
        try {
            let res = operationsAPI::getOrders(#{ limit: 100 });
            set_state("orders", res.data);
        } catch (err) {
            alert(`Error loading orders: ${err}`);
        }
        set_state("fetching", false);
    });
    if fetching {
        return ui::card("Update Order Status", [ui::text("Loading orders...")]);
    }
    let options = orders.map(|o| #{ value: o.id, label: `${o.order_number} - ${o.customer_name} (ID: ${o.id})` });
    let statuses = ["pending", "processing", "shipped", "completed", "cancelled"];
    ui::card("Update Order Status", [
        ui::select(#{ label: "Select Order", bind: "selected_order_id", options: options }),
        ui::select(#{ label: "Status", bind: "status", options: statuses, value: use_state("status", "pending") }),
        ui::button(#{ label: if saving { "Updating..." } else { "Update Order" }, disabled: saving, on_click: || {
            let id = use_state("selected_order_id", "");
            if id == "" {
                alert("Please select an order");
                return;
            }
            set_state("saving", true);
            try {
                operationsAPI::updateOrder(id, #{ status: use_state("status", "pending") });
                alert("Order updated successfully");
            } catch (err) {
                alert(`Error: ${err}`);
            }
            set_state("saving", false);
        }}),
        ui::card("Suggested Actions", [
            ui::row([
                Link::to("/operations", "View All Orders"),
                Link::to("/logistics", "View Shipments"),
                Link::to("/", "Dashboard")
            ])
        ])
    ])
}"#;

pub(crate) const LOW_STOCK_COST: &str = r#"fn UpdateLowStockProductCost() {
    let products = use_state("products", []);
    let fetching = use_state("fetching", true);
    use_effect("load_low_stock", || {
        try {
            let res = inventoryAPI::getProducts(#{ low_stock: "true" });
            set_state("products", res.data);
            for p in res.data {
                set_state(`cost_${p.id}`, p.cost ?? 0.0);
            }
        } catch (err) {
            alert(`Error loading products: ${err}`);
        }
        set_state("fetching", false);
    });
    if fetching {
        return ui::card("Update Cost for Low Stock Products", [ui::text("Loading low stock products...")]);
    }
    if products.is_empty() {
        return ui::card("Update Cost for Low Stock Products", [ui::text("No products are currently low on stock.")]);
    }
    let table = ui::table(
        ["Product Name", "SKU", "Current Stock", "Current Cost"],
        products.map(|p| [p.name, p.sku, p.stock_quantity, p.cost])
    );
    let editors = products.map(|p| ui::row([
        ui::input(#{ label: `New cost for ${p.name}`, bind: `cost_${p.id}`, kind: "number" }),
        ui::button(#{ label: "Update", on_click: || {
            let cost = use_state(`cost_${p.id}`, 0.0);
            if cost < 0 {
                alert("Please enter a valid cost");
                return;
            }
            try {
                inventoryAPI::updateProduct(p.id, #{ cost: cost });
                alert("Cost updated successfully");
                let res = inventoryAPI::getProducts(#{ low_stock: "true" });
                set_state("products", res.data);
            } catch (err) {
                alert(`Error updating cost: ${err}`);
            }
        }})
    ]));
    ui::card("Update Cost for Low Stock Products", [
        ui::text(`Found ${products.len()} product(s) with low stock`),
        table,
        editors
    ])
}"#;

pub const EXAMPLES: [Example; 3] = [
    Example {
        heading: "Edit Product Stock Threshold (with dropdown)",
        title: "Edit Product Stock Threshold",
        description: "Form to edit product low stock threshold with product selection dropdown",
        code: EDIT_STOCK_THRESHOLD,
        explanation: "Form to edit product low stock threshold with product dropdown selection using inventoryAPI",
    },
    Example {
        heading: "Update Order Status (with dropdown and quick actions)",
        title: "Update Order Status",
        description: "Form to update order status with order selection dropdown and suggested quick actions",
        code: UPDATE_ORDER_STATUS,
        explanation: "Form to update order status with order dropdown selection, includes quick action links based on user activity patterns",
    },
    Example {
        heading: "Edit Cost of Low Stock Products (conditional filtering)",
        title: "Update Cost for Low Stock Products",
        description: "Edit cost for products that are low on stock",
        code: LOW_STOCK_COST,
        explanation: "Component to edit cost for products filtered by low stock condition, with per-row editing and update",
    },
];
