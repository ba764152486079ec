//! Xero accounting tools.

use serde::Deserialize;
use serde_json::{json, Value};

use fte_dispatch::{DispatchResult, JsonMap, ToolDescriptor, ToolError, ToolRegistry, ToolResult};

use super::{bind, days_from_today, decode, limit_or, now_iso, today, ToolContext};
use crate::client::ApiRequest;

const DEFAULT_ACCOUNT_CODE: &str = "200";

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> DispatchResult<()> {
    registry.register(create_invoice_definition(), bind(ctx, create_invoice))?;
    registry.register(log_transaction_definition(), bind(ctx, log_transaction))?;
    registry.register(get_balance_definition(), bind(ctx, get_balance))?;
    registry.register(get_invoices_definition(), bind(ctx, get_invoices))?;
    registry.register(get_profit_loss_definition(), bind(ctx, get_profit_loss))?;
    Ok(())
}

/// Attach the headers every Xero call carries.
fn authorize(ctx: &ToolContext, request: ApiRequest) -> Result<ApiRequest, ToolError> {
    let token = ctx.config.require("XERO_ACCESS_TOKEN")?;
    let tenant = ctx.config.require("XERO_TENANT_ID")?;
    Ok(request
        .bearer(token)
        .header("Xero-Tenant-Id", tenant)
        .header("Accept", "application/json"))
}

fn url(ctx: &ToolContext, path: &str) -> String {
    format!("{}/{path}", ctx.config.endpoints.xero)
}

/// First report of a Reports response, else the whole body.
fn first_report(response: Value) -> Value {
    match response.pointer("/Reports/0") {
        Some(report) => report.clone(),
        None => response,
    }
}

/// Short reference number derived from the clock, e.g. `INV-123456`.
fn reference(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{prefix}-{:06}", millis.rem_euclid(1_000_000))
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceParams {
    #[serde(default)]
    contact_id: Option<String>,
    contact_name: String,
    #[serde(default)]
    invoice_number: Option<String>,
    amount: f64,
    description: String,
    #[serde(default)]
    due_date: Option<String>,
}

pub fn create_invoice_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "create_invoice",
        "Create a new invoice in Xero",
        json!({
            "type": "object",
            "properties": {
                "contact_id": { "type": "string", "description": "Xero contact ID" },
                "contact_name": { "type": "string", "description": "Contact name if not using ID" },
                "invoice_number": { "type": "string", "description": "Invoice number" },
                "amount": { "type": "number", "description": "Total invoice amount" },
                "description": { "type": "string", "description": "Invoice line description" },
                "due_date": { "type": "string", "description": "Due date (YYYY-MM-DD)" }
            },
            "required": ["contact_name", "amount", "description"]
        }),
    )
}

async fn create_invoice(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: CreateInvoiceParams = decode(input)?;
    let invoice_number = params
        .invoice_number
        .clone()
        .unwrap_or_else(|| reference("INV"));

    let contact = match &params.contact_id {
        Some(id) => json!({ "ContactID": id, "Name": params.contact_name }),
        None => json!({ "Name": params.contact_name }),
    };

    let payload = json!({
        "Type": "ACCREC",
        "Status": "DRAFT",
        "LineItems": [{
            "Description": params.description,
            "Quantity": 1,
            "UnitAmount": params.amount,
            "AccountCode": DEFAULT_ACCOUNT_CODE
        }],
        "Contact": contact,
        "InvoiceNumber": invoice_number,
        "DueDate": params.due_date.clone().unwrap_or_else(|| days_from_today(30))
    });

    let request = authorize(&ctx, ApiRequest::post(url(&ctx, "Invoices"), payload))?;
    let response = ctx.client.call(request).await?;

    let invoice_id = response
        .pointer("/Invoices/0/InvoiceID")
        .cloned()
        .unwrap_or_else(|| json!(invoice_number));

    Ok(json!({
        "status": "created",
        "invoice_id": invoice_id,
        "invoice_number": invoice_number,
        "contact": params.contact_name,
        "amount": params.amount,
        "created_at": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct LogTransactionParams {
    amount: f64,
    description: String,
    account: String,
    #[serde(default)]
    transaction_type: Option<String>,
    #[serde(default)]
    bank_account_code: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

pub fn log_transaction_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "log_transaction",
        "Log transaction to Xero accounting system",
        json!({
            "type": "object",
            "properties": {
                "amount": { "type": "number", "description": "Transaction amount" },
                "description": { "type": "string", "description": "Transaction description" },
                "account": { "type": "string", "description": "Account code" },
                "transaction_type": {
                    "type": "string",
                    "enum": ["RECEIVE", "SPEND", "ACCRECPAYABLE", "ACCRECEIVABLE", "BANK", "EXPENSE"],
                    "description": "Transaction type"
                },
                "bank_account_code": { "type": "string", "description": "Bank account code for BankTransactions" },
                "date": { "type": "string", "description": "Transaction date (YYYY-MM-DD)" }
            },
            "required": ["amount", "description", "account"]
        }),
    )
}

/// Map the accepted transaction types onto Xero's RECEIVE/SPEND.
fn bank_transaction_type(requested: Option<&str>) -> String {
    match requested {
        Some("ACCRECPAYABLE") | Some("EXPENSE") => "SPEND".to_string(),
        Some("ACCRECEIVABLE") | Some("BANK") => "RECEIVE".to_string(),
        Some(other) => other.to_string(),
        None => "RECEIVE".to_string(),
    }
}

async fn log_transaction(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: LogTransactionParams = decode(input)?;

    let bank_account_code = params
        .bank_account_code
        .clone()
        .or_else(|| ctx.config.credential("XERO_BANK_ACCOUNT_CODE").map(str::to_string))
        .ok_or_else(|| {
            ToolError::rejected(
                "Missing bank account code. Set bank_account_code or XERO_BANK_ACCOUNT_CODE.",
            )
        })?;

    let date = params.date.clone().unwrap_or_else(today);
    let payload = json!({
        "Type": bank_transaction_type(params.transaction_type.as_deref()),
        "Status": "AUTHORISED",
        "LineItems": [{
            "Description": params.description,
            "Quantity": 1,
            "UnitAmount": params.amount,
            "AccountCode": params.account
        }],
        "Contact": { "Name": "Internal" },
        "BankAccount": { "Code": bank_account_code },
        "Date": date
    });

    let request = authorize(&ctx, ApiRequest::post(url(&ctx, "BankTransactions"), payload))?;
    let response = ctx.client.call(request).await?;

    let transaction_id = response
        .pointer("/BankTransactions/0/BankTransactionID")
        .cloned()
        .unwrap_or_else(|| json!(reference("TXN")));

    Ok(json!({
        "status": "logged",
        "transaction_id": transaction_id,
        "amount": params.amount,
        "description": params.description,
        "account": params.account,
        "transaction_type": params.transaction_type.as_deref().unwrap_or("BANK"),
        "date": date,
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct GetBalanceParams {
    #[serde(default)]
    account_code: Option<String>,
    #[serde(default = "default_period")]
    period: String,
}

fn default_period() -> String {
    "current_month".to_string()
}

pub fn get_balance_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_balance",
        "Get current account balance and financial summary",
        json!({
            "type": "object",
            "properties": {
                "account_code": { "type": "string", "description": "Specific account code (optional)" },
                "period": {
                    "type": "string",
                    "enum": ["current_month", "current_year", "all_time"],
                    "description": "Period for balance",
                    "default": "current_month"
                }
            }
        }),
    )
}

async fn get_balance(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: GetBalanceParams = decode(input)?;

    let request = authorize(&ctx, ApiRequest::get(url(&ctx, "Reports/BalanceSheet")))?;
    let response = ctx.client.call(request).await?;

    Ok(json!({
        "period": params.period,
        "account_code": params.account_code,
        "report": first_report(response),
        "updated_at": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct GetInvoicesParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<f64>,
}

const DEFAULT_INVOICE_LIMIT: usize = 20;

pub fn get_invoices_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_invoices",
        "Retrieve invoices with optional filtering",
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["DRAFT", "SUBMITTED", "AUTHORISED", "PAID"],
                    "description": "Invoice status filter"
                },
                "limit": { "type": "number", "description": "Max results", "default": 20 }
            }
        }),
    )
}

fn summarize_invoice(invoice: &Value) -> Value {
    let field = |name: &str| invoice.get(name).cloned().unwrap_or(Value::Null);
    json!({
        "id": field("InvoiceID"),
        "number": field("InvoiceNumber"),
        "contact": invoice.pointer("/Contact/Name").cloned().unwrap_or(Value::Null),
        "amount": field("Total"),
        "status": field("Status"),
        "due_date": field("DueDate")
    })
}

async fn get_invoices(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: GetInvoicesParams = decode(input)?;
    let limit = limit_or(params.limit, DEFAULT_INVOICE_LIMIT);

    let mut request = ApiRequest::get(url(&ctx, "Invoices"));
    if let Some(status) = &params.status {
        request = request.query("where", format!("Status==\"{status}\""));
    }
    let response = ctx.client.call(authorize(&ctx, request)?).await?;

    let invoices: Vec<Value> = response
        .get("Invoices")
        .and_then(Value::as_array)
        .map(|all| all.iter().take(limit).map(summarize_invoice).collect())
        .unwrap_or_default();

    Ok(json!({
        "count": invoices.len(),
        "invoices": invoices,
        "limit": limit
    }))
}

#[derive(Debug, Deserialize)]
struct ProfitLossParams {
    #[serde(default)]
    from_date: Option<String>,
    #[serde(default)]
    to_date: Option<String>,
}

pub fn get_profit_loss_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_profit_loss",
        "Generate profit & loss statement",
        json!({
            "type": "object",
            "properties": {
                "from_date": { "type": "string", "description": "Start date (YYYY-MM-DD)" },
                "to_date": { "type": "string", "description": "End date (YYYY-MM-DD)" }
            }
        }),
    )
}

async fn get_profit_loss(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: ProfitLossParams = decode(input)?;

    let mut request = ApiRequest::get(url(&ctx, "Reports/ProfitAndLoss"));
    if let Some(from) = &params.from_date {
        request = request.query("fromDate", from);
    }
    if let Some(to) = &params.to_date {
        request = request.query("toDate", to);
    }
    let response = ctx.client.call(authorize(&ctx, request)?).await?;

    Ok(json!({
        "from_date": params.from_date,
        "to_date": params.to_date,
        "report": first_report(response),
        "statement_date": now_iso()
    }))
}
