//! Odoo accounting tools over JSON-RPC.
//!
//! All calls go to `<ODOO_URL>/jsonrpc`. The first tool call logs in and the
//! returned uid is reused for the life of the process.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use fte_dispatch::{
    handler_fn, DispatchResult, JsonMap, ToolDescriptor, ToolError, ToolHandler, ToolRegistry,
    ToolResult,
};

use super::{days_from_today, decode, limit_or, now_iso, today, ToolContext};
use crate::client::{ApiError, ApiRequest};

const DEFAULT_DB: &str = "gte";
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";

/// Per-process Odoo session.
pub struct OdooRpc {
    ctx: ToolContext,
    uid: OnceCell<i64>,
}

impl OdooRpc {
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            ctx,
            uid: OnceCell::new(),
        }
    }

    fn db(&self) -> &str {
        self.ctx.config.credential("ODOO_DB").unwrap_or(DEFAULT_DB)
    }

    fn username(&self) -> &str {
        self.ctx
            .config
            .credential("ODOO_USERNAME")
            .unwrap_or(DEFAULT_USERNAME)
    }

    fn password(&self) -> &str {
        self.ctx
            .config
            .credential("ODOO_PASSWORD")
            .unwrap_or(DEFAULT_PASSWORD)
    }

    async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, ToolError> {
        let url = format!("{}/jsonrpc", self.ctx.config.endpoints.odoo);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": uuid::Uuid::new_v4().to_string()
        });

        let mut response = self.ctx.client.call(ApiRequest::post(url, body)).await?;

        if let Some(error) = response.get("error") {
            let message = error
                .pointer("/data/message")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ApiError::Remote(format!("Odoo error: {message}")).into());
        }

        Ok(response
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Log in on first use.
    pub async fn uid(&self) -> Result<i64, ToolError> {
        self.uid
            .get_or_try_init(|| async {
                let result = self
                    .call(
                        "common",
                        "login",
                        json!([self.db(), self.username(), self.password()]),
                    )
                    .await?;
                let uid = result.as_i64().ok_or_else(|| {
                    ToolError::failed("Authentication failed: invalid credentials")
                })?;
                tracing::info!(uid, "Odoo authenticated");
                Ok::<i64, ToolError>(uid)
            })
            .await
            .copied()
    }

    pub async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, ToolError> {
        let uid = self.uid().await?;
        self.call(
            "object",
            "execute_kw",
            json!([self.db(), uid, self.password(), model, method, args, kwargs]),
        )
        .await
    }

    async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<Value>, ToolError> {
        let kwargs = match limit {
            Some(limit) => json!({ "limit": limit }),
            None => json!({}),
        };
        let records = self
            .execute_kw(model, "search_read", json!([domain, fields]), kwargs)
            .await?;
        Ok(match records {
            Value::Array(records) => records,
            _ => Vec::new(),
        })
    }

    async fn create(&self, model: &str, values: Value) -> Result<i64, ToolError> {
        let id = self
            .execute_kw(model, "create", json!([values]), json!({}))
            .await?;
        id.as_i64()
            .ok_or_else(|| ToolError::failed(format!("Odoo returned no id for new {model}")))
    }

    /// Partner id by exact name, creating the partner if none exists.
    async fn find_or_create_partner(&self, name: &str, supplier: bool) -> Result<i64, ToolError> {
        let found = self
            .execute_kw(
                "res.partner",
                "search",
                json!([[["name", "=", name]]]),
                json!({ "limit": 1 }),
            )
            .await?;
        if let Some(id) = found.get(0).and_then(Value::as_i64) {
            return Ok(id);
        }

        let mut values = json!({ "name": name, "is_company": true });
        if supplier {
            values["supplier_rank"] = json!(1);
        }
        let id = self.create("res.partner", values).await?;
        tracing::info!(partner_id = id, "Created Odoo partner {name}");
        Ok(id)
    }
}

fn bind_rpc<F, Fut>(rpc: &Arc<OdooRpc>, f: F) -> impl ToolHandler + 'static
where
    F: Fn(Arc<OdooRpc>, JsonMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    let rpc = rpc.clone();
    handler_fn(move |input| f(rpc.clone(), input))
}

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> DispatchResult<()> {
    let rpc = Arc::new(OdooRpc::new(ctx.clone()));
    registry.register(create_invoice_definition(), bind_rpc(&rpc, create_invoice))?;
    registry.register(create_bill_definition(), bind_rpc(&rpc, create_bill))?;
    registry.register(log_transaction_definition(), bind_rpc(&rpc, log_transaction))?;
    registry.register(get_accounts_definition(), bind_rpc(&rpc, get_accounts))?;
    registry.register(get_invoices_definition(), bind_rpc(&rpc, get_invoices))?;
    registry.register(get_balance_definition(), bind_rpc(&rpc, get_balance))?;
    registry.register(get_profit_loss_definition(), bind_rpc(&rpc, get_profit_loss))?;
    Ok(())
}

fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Odoo's `(0, 0, values)` create command for one-to-many fields.
fn create_line(values: Value) -> Value {
    json!([0, 0, values])
}

#[derive(Debug, Deserialize)]
struct LineItem {
    name: String,
    #[serde(default)]
    quantity: Option<f64>,
    #[serde(default)]
    price_unit: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceParams {
    contact_name: String,
    amount: f64,
    description: String,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    invoice_line_items: Vec<LineItem>,
}

pub fn create_invoice_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "create_invoice",
        "Create a customer invoice (account.move) in Odoo",
        json!({
            "type": "object",
            "properties": {
                "contact_name": {
                    "type": "string",
                    "description": "Customer/Partner name (will search or create if not found)"
                },
                "amount": { "type": "number", "description": "Invoice amount (total)" },
                "description": { "type": "string", "description": "Invoice line description/memo" },
                "due_date": {
                    "type": "string",
                    "description": "Due date in YYYY-MM-DD format (optional, defaults to 30 days from now)"
                },
                "invoice_line_items": {
                    "type": "array",
                    "description": "Optional detailed line items (name, quantity, price_unit)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "quantity": { "type": "number" },
                            "price_unit": { "type": "number" }
                        }
                    }
                }
            },
            "required": ["contact_name", "amount", "description"]
        }),
    )
}

/// Invoice lines from explicit items, or a single line for the whole amount.
fn invoice_lines(params: &CreateInvoiceParams) -> Vec<Value> {
    if params.invoice_line_items.is_empty() {
        return vec![create_line(json!({
            "name": params.description,
            "quantity": 1,
            "price_unit": params.amount
        }))];
    }

    let even_split = params.amount / params.invoice_line_items.len() as f64;
    params
        .invoice_line_items
        .iter()
        .map(|item| {
            create_line(json!({
                "name": item.name,
                "quantity": item.quantity.unwrap_or(1.0),
                "price_unit": item.price_unit.unwrap_or(even_split)
            }))
        })
        .collect()
}

async fn create_invoice(rpc: Arc<OdooRpc>, input: JsonMap) -> ToolResult {
    let params: CreateInvoiceParams = decode(input)?;
    let partner_id = rpc.find_or_create_partner(&params.contact_name, false).await?;

    let invoice_id = rpc
        .create(
            "account.move",
            json!({
                "move_type": "out_invoice",
                "partner_id": partner_id,
                "invoice_line_ids": invoice_lines(&params),
                "invoice_date": today(),
                "invoice_date_due": params.due_date.clone().unwrap_or_else(|| days_from_today(30))
            }),
        )
        .await?;

    Ok(json!({
        "status": "created",
        "invoice_id": invoice_id,
        "partner_id": partner_id,
        "amount": params.amount,
        "message": format!("Invoice {invoice_id} created for {}", params.contact_name),
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct CreateBillParams {
    vendor_name: String,
    amount: f64,
    description: String,
    #[serde(default)]
    due_date: Option<String>,
}

pub fn create_bill_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "create_bill",
        "Create a vendor bill (account.move type=in_invoice) in Odoo",
        json!({
            "type": "object",
            "properties": {
                "vendor_name": { "type": "string", "description": "Vendor/Supplier name" },
                "amount": { "type": "number", "description": "Bill total amount" },
                "description": { "type": "string", "description": "Bill line description/memo" },
                "due_date": { "type": "string", "description": "Due date in YYYY-MM-DD format (optional)" }
            },
            "required": ["vendor_name", "amount", "description"]
        }),
    )
}

async fn create_bill(rpc: Arc<OdooRpc>, input: JsonMap) -> ToolResult {
    let params: CreateBillParams = decode(input)?;
    let vendor_id = rpc.find_or_create_partner(&params.vendor_name, true).await?;

    let bill_id = rpc
        .create(
            "account.move",
            json!({
                "move_type": "in_invoice",
                "partner_id": vendor_id,
                "invoice_line_ids": [create_line(json!({
                    "name": params.description,
                    "quantity": 1,
                    "price_unit": params.amount
                }))],
                "invoice_date": today(),
                "invoice_date_due": params.due_date.clone().unwrap_or_else(|| days_from_today(30))
            }),
        )
        .await?;

    Ok(json!({
        "status": "created",
        "bill_id": bill_id,
        "vendor_id": vendor_id,
        "amount": params.amount,
        "message": format!("Bill {bill_id} created for {}", params.vendor_name),
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct LogTransactionParams {
    amount: f64,
    description: String,
    account: String,
    transaction_type: String,
    #[serde(default)]
    date: Option<String>,
}

pub fn log_transaction_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "log_transaction",
        "Log a journal entry (account.move) for bank/accounting transactions",
        json!({
            "type": "object",
            "properties": {
                "amount": { "type": "number", "description": "Transaction amount" },
                "description": { "type": "string", "description": "Transaction description" },
                "account": { "type": "string", "description": "Account code or name" },
                "transaction_type": { "type": "string", "description": "BANK, EXPENSE, REVENUE, etc." },
                "date": { "type": "string", "description": "Transaction date in YYYY-MM-DD format" },
                "bank_account_code": { "type": "string", "description": "Bank account code (optional)" }
            },
            "required": ["amount", "description", "account", "transaction_type"]
        }),
    )
}

/// Bank movements post to a bank journal, everything else to a general one.
fn journal_type(transaction_type: &str) -> &'static str {
    if transaction_type.eq_ignore_ascii_case("BANK") {
        "bank"
    } else {
        "general"
    }
}

/// Two balanced lines: `account` takes the signed amount, `counterpart` the opposite.
fn journal_lines(description: &str, amount: f64, account: i64, counterpart: i64) -> Vec<Value> {
    let magnitude = amount.abs();
    let (debit, credit) = if amount >= 0.0 {
        (magnitude, 0.0)
    } else {
        (0.0, magnitude)
    };
    vec![
        create_line(json!({
            "name": description,
            "account_id": account,
            "debit": debit,
            "credit": credit
        })),
        create_line(json!({
            "name": description,
            "account_id": counterpart,
            "debit": credit,
            "credit": debit
        })),
    ]
}

/// Id out of a many2one value (`[id, "display name"]`).
fn many2one_id(value: Option<&Value>) -> Option<i64> {
    value.and_then(|v| v.get(0)).and_then(Value::as_i64)
}

async fn log_transaction(rpc: Arc<OdooRpc>, input: JsonMap) -> ToolResult {
    let params: LogTransactionParams = decode(input)?;

    let accounts = rpc
        .search_read(
            "account.account",
            json!([
                "|",
                ["code", "=", params.account],
                ["name", "=ilike", params.account]
            ]),
            &["id", "code", "name"],
            Some(1),
        )
        .await?;
    let account_id = accounts
        .first()
        .and_then(|a| a.get("id"))
        .and_then(Value::as_i64)
        .ok_or_else(|| ToolError::rejected(format!("Unknown account: {}", params.account)))?;

    let kind = journal_type(&params.transaction_type);
    let journals = rpc
        .search_read(
            "account.journal",
            json!([["type", "=", kind]]),
            &["id", "name", "default_account_id"],
            Some(1),
        )
        .await?;
    let journal = journals
        .first()
        .ok_or_else(|| ToolError::failed(format!("No {kind} journal configured in Odoo")))?;
    let journal_id = journal.get("id").and_then(Value::as_i64).unwrap_or_default();
    let counterpart = many2one_id(journal.get("default_account_id")).ok_or_else(|| {
        ToolError::failed(format!("Journal {journal_id} has no default account"))
    })?;

    let date = params.date.clone().unwrap_or_else(today);
    let entry_id = rpc
        .create(
            "account.move",
            json!({
                "move_type": "entry",
                "journal_id": journal_id,
                "date": date,
                "ref": params.description,
                "line_ids": journal_lines(&params.description, params.amount, account_id, counterpart)
            }),
        )
        .await?;

    Ok(json!({
        "status": "logged",
        "transaction_id": entry_id,
        "amount": params.amount,
        "account": params.account,
        "transaction_type": params.transaction_type,
        "date": date,
        "message": format!("Transaction {entry_id} logged for {}", params.description),
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct GetAccountsParams {
    #[serde(default)]
    filter_type: Option<String>,
    #[serde(default)]
    limit: Option<f64>,
}

const DEFAULT_ACCOUNT_LIMIT: usize = 100;

pub fn get_accounts_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_accounts",
        "Fetch list of accounts (chart of accounts) from Odoo",
        json!({
            "type": "object",
            "properties": {
                "filter_type": {
                    "type": "string",
                    "description": "Filter by type: asset, liability, equity, income, expense, bank, payable, receivable (optional)"
                },
                "limit": { "type": "number", "description": "Max number of accounts to return (default: 100)" }
            }
        }),
    )
}

async fn get_accounts(rpc: Arc<OdooRpc>, input: JsonMap) -> ToolResult {
    let params: GetAccountsParams = decode(input)?;

    let domain = match &params.filter_type {
        Some(kind) => json!([["account_type", "ilike", kind]]),
        None => json!([]),
    };
    let accounts = rpc
        .search_read(
            "account.account",
            domain,
            &["id", "code", "name", "account_type", "current_balance"],
            Some(limit_or(params.limit, DEFAULT_ACCOUNT_LIMIT)),
        )
        .await?;

    Ok(json!({
        "status": "success",
        "count": accounts.len(),
        "accounts": accounts,
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct GetInvoicesParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    from_date: Option<String>,
    #[serde(default)]
    to_date: Option<String>,
    #[serde(default)]
    limit: Option<f64>,
}

const DEFAULT_INVOICE_LIMIT: usize = 50;

pub fn get_invoices_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_invoices",
        "Query invoices from Odoo with filters",
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "Filter by status: draft, posted, paid, cancel (optional)"
                },
                "customer_name": {
                    "type": "string",
                    "description": "Filter by customer name (optional, partial match)"
                },
                "from_date": { "type": "string", "description": "From date in YYYY-MM-DD format (optional)" },
                "to_date": { "type": "string", "description": "To date in YYYY-MM-DD format (optional)" },
                "limit": { "type": "number", "description": "Max number of invoices to return (default: 50)" }
            }
        }),
    )
}

fn invoice_domain(params: &GetInvoicesParams) -> Value {
    let mut domain = vec![json!(["move_type", "=", "out_invoice"])];
    match params.status.as_deref() {
        // "paid" is a payment state, not a posting state.
        Some("paid") => domain.push(json!(["payment_state", "=", "paid"])),
        Some(state) => domain.push(json!(["state", "=", state])),
        None => {}
    }
    if let Some(name) = &params.customer_name {
        domain.push(json!(["partner_id.name", "ilike", name]));
    }
    if let Some(from) = &params.from_date {
        domain.push(json!(["invoice_date", ">=", from]));
    }
    if let Some(to) = &params.to_date {
        domain.push(json!(["invoice_date", "<=", to]));
    }
    Value::Array(domain)
}

async fn get_invoices(rpc: Arc<OdooRpc>, input: JsonMap) -> ToolResult {
    let params: GetInvoicesParams = decode(input)?;

    let invoices = rpc
        .search_read(
            "account.move",
            invoice_domain(&params),
            &[
                "id",
                "name",
                "partner_id",
                "invoice_date",
                "invoice_date_due",
                "amount_total",
                "state",
                "payment_state",
            ],
            Some(limit_or(params.limit, DEFAULT_INVOICE_LIMIT)),
        )
        .await?;

    Ok(json!({
        "status": "success",
        "count": invoices.len(),
        "invoices": invoices,
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct GetBalanceParams {
    #[serde(default)]
    account_code: Option<String>,
    #[serde(default)]
    as_of_date: Option<String>,
}

pub fn get_balance_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_balance",
        "Get account balance or balance sheet data",
        json!({
            "type": "object",
            "properties": {
                "account_code": { "type": "string", "description": "Account code to get balance for (optional)" },
                "as_of_date": { "type": "string", "description": "Balance as of date in YYYY-MM-DD format (default: today)" }
            }
        }),
    )
}

async fn get_balance(rpc: Arc<OdooRpc>, input: JsonMap) -> ToolResult {
    let params: GetBalanceParams = decode(input)?;

    let domain = match &params.account_code {
        Some(code) => json!([["code", "=", code]]),
        None => json!([]),
    };
    let accounts = rpc
        .search_read(
            "account.account",
            domain,
            &["id", "code", "name", "current_balance"],
            None,
        )
        .await?;

    let total: f64 = accounts
        .iter()
        .filter_map(|a| a.get("current_balance").and_then(Value::as_f64))
        .sum();

    Ok(json!({
        "status": "success",
        "accounts": accounts,
        "total_balance": round_money(total),
        "as_of_date": params.as_of_date.unwrap_or_else(today),
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct ProfitLossParams {
    from_date: String,
    to_date: String,
}

pub fn get_profit_loss_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_profit_loss",
        "Generate profit & loss report for a date range",
        json!({
            "type": "object",
            "properties": {
                "from_date": { "type": "string", "description": "Start date in YYYY-MM-DD format (required)" },
                "to_date": { "type": "string", "description": "End date in YYYY-MM-DD format (required)" }
            },
            "required": ["from_date", "to_date"]
        }),
    )
}

#[derive(Debug, Default, PartialEq)]
struct ProfitLoss {
    revenue: f64,
    expenses: f64,
}

/// Revenue is credit minus debit on income accounts; expenses are debit
/// minus credit on expense accounts. Other lines are ignored.
fn profit_loss(lines: &[Value]) -> ProfitLoss {
    let mut totals = ProfitLoss::default();
    for line in lines {
        let amount = |field: &str| line.get(field).and_then(Value::as_f64).unwrap_or(0.0);
        let (debit, credit) = (amount("debit"), amount("credit"));
        match line.get("account_type").and_then(Value::as_str) {
            Some(kind) if kind.starts_with("income") => totals.revenue += credit - debit,
            Some(kind) if kind.starts_with("expense") => totals.expenses += debit - credit,
            _ => {}
        }
    }
    totals
}

async fn get_profit_loss(rpc: Arc<OdooRpc>, input: JsonMap) -> ToolResult {
    let params: ProfitLossParams = decode(input)?;

    let lines = rpc
        .search_read(
            "account.move.line",
            json!([
                ["parent_state", "=", "posted"],
                ["date", ">=", params.from_date],
                ["date", "<=", params.to_date]
            ]),
            &["account_id", "account_type", "debit", "credit"],
            None,
        )
        .await?;

    let totals = profit_loss(&lines);
    let revenue = round_money(totals.revenue);
    let expenses = round_money(totals.expenses);

    Ok(json!({
        "status": "success",
        "period": { "from": params.from_date, "to": params.to_date },
        "revenue": revenue,
        "expenses": expenses,
        "net_profit": round_money(revenue - expenses),
        "line_count": lines.len(),
        "timestamp": now_iso()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_lines_balance() {
        let lines = journal_lines("Coffee", -12.5, 7, 3);
        assert_eq!(lines[0], json!([0, 0, {"name": "Coffee", "account_id": 7, "debit": 0.0, "credit": 12.5}]));
        assert_eq!(lines[1], json!([0, 0, {"name": "Coffee", "account_id": 3, "debit": 12.5, "credit": 0.0}]));
    }

    #[test]
    fn test_profit_loss_by_account_type() {
        let lines = vec![
            json!({"account_type": "income", "debit": 0.0, "credit": 1000.0}),
            json!({"account_type": "income_other", "debit": 50.0, "credit": 0.0}),
            json!({"account_type": "expense", "debit": 300.0, "credit": 0.0}),
            json!({"account_type": "expense_direct_cost", "debit": 100.0, "credit": 20.0}),
            json!({"account_type": "asset_receivable", "debit": 1000.0, "credit": 0.0}),
        ];
        assert_eq!(
            profit_loss(&lines),
            ProfitLoss {
                revenue: 950.0,
                expenses: 380.0
            }
        );
    }

    #[test]
    fn test_invoice_lines_even_split() {
        let params = CreateInvoiceParams {
            contact_name: "Acme".into(),
            amount: 90.0,
            description: "Consulting".into(),
            due_date: None,
            invoice_line_items: vec![
                LineItem { name: "A".into(), quantity: None, price_unit: None },
                LineItem { name: "B".into(), quantity: Some(2.0), price_unit: Some(10.0) },
            ],
        };
        let lines = invoice_lines(&params);
        assert_eq!(lines[0], json!([0, 0, {"name": "A", "quantity": 1.0, "price_unit": 45.0}]));
        assert_eq!(lines[1], json!([0, 0, {"name": "B", "quantity": 2.0, "price_unit": 10.0}]));
    }

    #[test]
    fn test_invoice_domain_paid() {
        let params = GetInvoicesParams {
            status: Some("paid".into()),
            customer_name: Some("Acme".into()),
            from_date: None,
            to_date: None,
            limit: None,
        };
        assert_eq!(
            invoice_domain(&params),
            json!([
                ["move_type", "=", "out_invoice"],
                ["payment_state", "=", "paid"],
                ["partner_id.name", "ilike", "Acme"]
            ])
        );
    }

    #[test]
    fn test_many2one_id() {
        assert_eq!(many2one_id(Some(&json!([12, "Bank"]))), Some(12));
        assert_eq!(many2one_id(Some(&json!(false))), None);
        assert_eq!(many2one_id(None), None);
    }
}
