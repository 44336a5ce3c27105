use serde::Serialize;

use super::{InvoiceGraph, WorkOrderGraph};
use crate::business_info::BusinessInfo;
use crate::customers::Customer;
use crate::equipment::Equipment;

/// Lines per A4 page at body size.
pub const LINES_PER_PAGE: usize = 48;
/// Body text is wrapped at this many characters.
pub const WRAP_WIDTH: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineStyle {
    Title,
    Heading,
    Body,
    Blank,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub style: LineStyle,
    pub text: String,
}

#[derive(Default)]
struct LayoutBuilder {
    lines: Vec<Line>,
}

impl LayoutBuilder {
    fn push(&mut self, style: LineStyle, text: impl Into<String>) {
        self.lines.push(Line {
            style,
            text: text.into(),
        });
    }

    fn title(&mut self, text: impl Into<String>) {
        self.push(LineStyle::Title, text);
    }

    fn heading(&mut self, text: impl Into<String>) {
        self.push(LineStyle::Heading, text);
    }

    /// Body text, split on newlines and wrapped.
    fn body(&mut self, text: &str) {
        if text.is_empty() {
            self.push(LineStyle::Body, "");
            return;
        }
        for raw in text.lines() {
            for chunk in wrap(raw, WRAP_WIDTH) {
                self.push(LineStyle::Body, chunk);
            }
        }
    }

    fn blank(&mut self) {
        self.push(LineStyle::Blank, "");
    }

    fn finish(self) -> Vec<Line> {
        self.lines
    }
}

/// Greedy word wrap; words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            out.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > width && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}

pub fn paginate(lines: &[Line]) -> Vec<&[Line]> {
    if lines.is_empty() {
        return vec![lines];
    }
    lines.chunks(LINES_PER_PAGE).collect()
}

fn money(amount: f64) -> String {
    format!("${amount:.2}")
}

fn business_block(b: &mut LayoutBuilder, info: &BusinessInfo) {
    let name = info
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("Business Name");
    b.title(name);
    if let Some(address) = info.address.as_deref().filter(|a| !a.is_empty()) {
        b.body(address);
    }
    b.body(&format!(
        "Phone: {}   Email: {}",
        info.phone.as_deref().unwrap_or(""),
        info.email.as_deref().unwrap_or("")
    ));
    if let Some(site) = info.website.as_deref().filter(|w| !w.is_empty()) {
        b.body(&format!("Website: {site}"));
    }
    b.blank();
}

fn customer_block(b: &mut LayoutBuilder, customer: Option<&Customer>) {
    b.heading("Customer");
    let empty = String::new();
    let (name, address, phone, email) = match customer {
        Some(c) => (
            c.display_name(),
            c.address.as_ref().unwrap_or(&empty),
            c.phone.as_ref().unwrap_or(&empty),
            c.email.as_ref().unwrap_or(&empty),
        ),
        None => (String::new(), &empty, &empty, &empty),
    };
    b.body(&name);
    if !address.is_empty() {
        b.body(address);
    }
    b.body(&format!("Phone: {phone}"));
    b.body(&format!("Email: {email}"));
    b.blank();
}

fn equipment_block(b: &mut LayoutBuilder, equipment: &Equipment) {
    b.heading("Equipment");
    for (label, value) in equipment.spec_lines() {
        b.body(&format!("{label}: {value}"));
    }
}

pub fn invoice_lines(info: &BusinessInfo, graph: &InvoiceGraph, today: &str) -> Vec<Line> {
    let mut b = LayoutBuilder::default();
    let invoice = &graph.invoice;
    business_block(&mut b, info);

    b.heading(format!("Invoice #{}", invoice.id));
    b.body(&format!("Status: {}", invoice.status.as_deref().unwrap_or("")));
    b.body(&format!("Date: {today}"));
    if let Some(due) = invoice.due_date.as_deref().filter(|d| !d.is_empty()) {
        b.body(&format!("Due date: {due}"));
    }
    b.blank();

    customer_block(&mut b, graph.customer.as_ref());

    if let Some(wo) = &graph.work_order {
        b.heading("Related Work Order");
        b.body(&format!("WO #{}", wo.id));
        if let Some(desc) = wo.description.as_deref().filter(|d| !d.is_empty()) {
            b.body(&format!("Description: {desc}"));
        }
        b.blank();
    }

    if !graph.items.is_empty() {
        b.heading("Items");
        for item in &graph.items {
            b.body(&format!(
                "{}  {} x {}  tax {}%  = {}",
                item.description.as_deref().unwrap_or(""),
                item.qty,
                money(item.unit_price),
                item.tax_rate,
                money(item.line_total)
            ));
        }
        b.blank();
    }

    b.heading("Amount");
    b.body(&money(invoice.amount.unwrap_or(0.0)));
    b.blank();

    if let Some(notes) = invoice.notes.as_deref().filter(|n| !n.is_empty()) {
        b.heading("Notes");
        b.body(notes);
    }
    if let Some(equipment) = &graph.equipment {
        b.blank();
        equipment_block(&mut b, equipment);
    }
    b.finish()
}

pub fn work_order_lines(info: &BusinessInfo, graph: &WorkOrderGraph) -> Vec<Line> {
    let mut b = LayoutBuilder::default();
    let wo = &graph.work_order;
    business_block(&mut b, info);

    b.heading(format!("Work Order #{}", wo.id));
    b.body(&format!("Status: {}", wo.status.as_deref().unwrap_or("")));
    b.body(&format!("Date created: {}", wo.date_created.as_deref().unwrap_or("")));
    if let Some(done) = wo.date_completed.as_deref().filter(|d| !d.is_empty()) {
        b.body(&format!("Date completed: {done}"));
    }
    if let Some(due) = wo.due_date.as_deref().filter(|d| !d.is_empty()) {
        b.body(&format!("Due date: {due}"));
    }
    b.blank();

    customer_block(&mut b, graph.customer.as_ref());

    b.heading("Work Description");
    b.body(wo.description.as_deref().unwrap_or(""));
    b.blank();

    if let Some(equipment) = &graph.equipment {
        equipment_block(&mut b, equipment);
        if let Some(notes) = equipment.notes.as_deref().filter(|n| !n.is_empty()) {
            b.heading("Equipment Notes");
            b.body(notes);
        }
    }
    b.finish()
}
