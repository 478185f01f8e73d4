use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, XlsxError};

use super::InquiryNotice;

pub const QUOTATION_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn quotation_filename(inquiry_no: &str) -> String {
    format!("quotation-{}.xlsx", inquiry_no)
}

/// Render the single-line quotation workbook for an inquiry
pub fn build_quotation(notice: &InquiryNotice) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();

    let title = Format::new().set_bold().set_font_size(16);
    let label = Format::new().set_bold();
    let header = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let cell = Format::new().set_border(FormatBorder::Thin);
    let money = Format::new().set_num_format("#,##0.00").set_border(FormatBorder::Thin);

    let sheet = workbook.add_worksheet();
    sheet.set_name("Quotation")?;
    sheet.set_column_width(0, 28)?;
    sheet.set_column_width(1, 18)?;
    sheet.set_column_width(2, 30)?;
    sheet.set_column_width(3, 10)?;
    sheet.set_column_width(4, 14)?;
    sheet.set_column_width(5, 14)?;

    sheet.write_string_with_format(0, 0, format!("{} Quotation", notice.site_name), &title)?;

    let customer = &notice.customer;
    let header_rows: [(&str, String); 7] = [
        ("Inquiry No.", notice.inquiry_no.clone()),
        ("Date", notice.created_at.format("%Y-%m-%d").to_string()),
        ("Customer", customer.name.clone()),
        ("Company", customer.company.clone().unwrap_or_default()),
        ("Email", customer.email.clone()),
        ("Phone", customer.phone.clone().unwrap_or_default()),
        ("Country", customer.country.clone().unwrap_or_default()),
    ];
    for (i, (name, value)) in header_rows.iter().enumerate() {
        let row = 2 + i as u32;
        sheet.write_string_with_format(row, 0, *name, &label)?;
        sheet.write_string(row, 1, value.as_str())?;
    }

    let table_row = 10;
    let columns = ["Product", "SKU", "Specification", "Qty", "Unit Price", "Subtotal"];
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(table_row, col as u16, *name, &header)?;
    }

    let item_row = table_row + 1;
    sheet.write_string_with_format(item_row, 0, notice.product_name.as_str(), &cell)?;
    sheet.write_string_with_format(item_row, 1, notice.sku_code.clone().unwrap_or_default(), &cell)?;
    sheet.write_string_with_format(item_row, 2, describe_spec(&notice.sku_spec), &cell)?;
    sheet.write_number_with_format(item_row, 3, notice.quantity as f64, &cell)?;

    match notice.unit_price {
        Some(price) => {
            sheet.write_number_with_format(item_row, 4, decimal_to_f64(price), &money)?;
            let subtotal = price * Decimal::from(notice.quantity);
            sheet.write_number_with_format(item_row, 5, decimal_to_f64(subtotal), &money)?;
        }
        None => {
            sheet.write_string_with_format(item_row, 4, "On request", &cell)?;
            sheet.write_string_with_format(item_row, 5, "", &cell)?;
        }
    }

    let mut row = item_row + 2;
    if let Some(currency) = notice.currency.as_deref() {
        sheet.write_string_with_format(row, 0, "Currency", &label)?;
        sheet.write_string(row, 1, currency)?;
        row += 1;
    }
    if let Some(message) = notice.message.as_deref().filter(|m| !m.trim().is_empty()) {
        sheet.write_string_with_format(row, 0, "Customer notes", &label)?;
        sheet.write_string(row, 1, message)?;
        row += 1;
    }
    if let Some(assignee) = &notice.assignee {
        sheet.write_string_with_format(row, 0, "Sales contact", &label)?;
        sheet.write_string(row, 1, format!("{} <{}>", assignee.name, assignee.email))?;
    }

    workbook.save_to_buffer()
}

/// `{"color":"red","size":"L"}` -> `color: red; size: L`
pub fn describe_spec(spec: &serde_json::Value) -> String {
    match spec {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{}: {}", k, s),
                other => format!("{}: {}", k, other),
            })
            .collect::<Vec<_>>()
            .join("; "),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
