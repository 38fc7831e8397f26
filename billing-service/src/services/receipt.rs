//! Receipt HTML assembly for the payment PDF.

use crate::config::CompanyConfig;
use crate::ledger::Totals;
use crate::models::Client;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Snapshot of one payment as it will appear on the receipt.
pub struct ReceiptDetails<'a> {
    pub customer_id: &'a str,
    pub paid_amount: Decimal,
    pub grand_total: Decimal,
    pub totals: Totals,
    pub payment_date: DateTime<Utc>,
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value)
}

/// Build the invoice-summary HTML document handed to the PDF renderer.
pub fn build_receipt_html(
    company: &CompanyConfig,
    client: &Client,
    details: &ReceiptDetails<'_>,
) -> String {
    let gst_number = client.gst_number.as_deref().unwrap_or("N/A");

    format!(
        r#"<style>
    body {{ font-family: Arial, sans-serif; margin: 20px; padding: 0; background-color: #f4f4f4; }}
    .invoice-container {{ background-color: #ffffff; padding: 20px; border-radius: 5px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
    .invoice-header {{ text-align: center; margin-bottom: 20px; }}
    .logo {{ width: 80px; height: auto; }}
    h2 {{ margin: 0; }}
    .contact-details, .company-details {{ text-align: center; margin: 10px 0; }}
    .customer-details {{ margin-top: 20px; border: 1px solid #ddd; border-radius: 5px; padding: 10px; }}
    .invoice-details {{ margin-top: 20px; padding: 10px; border: 1px solid #ddd; border-radius: 5px; }}
    h1 {{ font-size: 24px; text-align: center; margin-bottom: 20px; }}
    p {{ margin: 5px 0; font-size: 16px; }}
    .total {{ font-weight: bold; font-size: 18px; }}
    .payment-info {{ margin-top: 10px; border-top: 1px solid #ddd; padding-top: 10px; }}
</style>
<div class="invoice-container">
    <div class="invoice-header">
        <img src="{logo_url}" alt="Company Logo" class="logo" />
        <h2 class="company-name">{company_name}</h2>
        <div class="contact-details">
            <p>Email: {company_email}</p>
            <p>Direct Line: {company_phone}</p>
        </div>
        <div class="company-details">
            <p>GSTN: {company_gstin}</p>
            <p>{company_address}</p>
        </div>
    </div>
    <h1>Invoice Details for Customer ID: {customer_id}</h1>
    <div class="customer-details">
        <h3>Customer Information</h3>
        <p><strong>Name:</strong> {name}</p>
        <p><strong>Business Name:</strong> {business_name}</p>
        <p><strong>Email:</strong> {email}</p>
        <p><strong>Mobile:</strong> {mobile}</p>
        <p><strong>Address:</strong> {address}</p>
        <p><strong>GST Number:</strong> {gst_number}</p>
    </div>
    <div class="invoice-details">
        <h3>Invoice Summary</h3>
        <p><strong>Paid Amount:</strong> {paid_amount}</p>
        <p class="total"><strong>Total Paid Amount:</strong> {total_paid}</p>
        <p class="total"><strong>Grand Total Amount with 18% Gst:</strong> {grand_total}</p>
        <p class="total"><strong>Unpaid Remaining Amount:</strong> {remaining}</p>
    </div>
    <div class="payment-info">
        <h3>Payment Details</h3>
        <p><strong>Payment Date:</strong> {payment_date}</p>
    </div>
</div>"#,
        logo_url = company.logo_url,
        company_name = company.name,
        company_email = company.email,
        company_phone = company.phone,
        company_gstin = company.gstin,
        company_address = company.address,
        customer_id = details.customer_id,
        name = client.name,
        business_name = client.business_name,
        email = client.email,
        mobile = client.mobile,
        address = client.address,
        gst_number = gst_number,
        paid_amount = money(details.paid_amount),
        total_paid = money(details.totals.total_paid),
        grand_total = money(details.grand_total),
        remaining = money(details.totals.remaining),
        payment_date = details.payment_date.format("%Y-%m-%d"),
    )
}
