use super::InquiryNotice;

/// Escape text for inclusion in HTML element content and attribute values
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn row(label: &str, value: &str) -> String {
    format!(
        "<tr><th align=\"left\" style=\"padding:4px 12px 4px 0\">{}</th><td>{}</td></tr>",
        html_escape(label),
        html_escape(value)
    )
}

fn price_text(notice: &InquiryNotice) -> String {
    match (notice.unit_price, notice.currency.as_deref()) {
        (Some(price), Some(currency)) => format!("{} {}", price.round_dp(2), currency),
        (Some(price), None) => price.round_dp(2).to_string(),
        (None, _) => "On request".to_string(),
    }
}

/// Notice to the assigned salesperson (or the public-pool inbox)
pub fn salesperson_notice(notice: &InquiryNotice) -> (String, String) {
    let subject = format!("[{}] New inquiry {} for {}", notice.site_name, notice.inquiry_no, notice.product_name);

    let greeting = match &notice.assignee {
        Some(assignee) => format!("Hi {},", html_escape(&assignee.name)),
        None => "Hello,".to_string(),
    };
    let routing = if notice.is_public {
        "No salesperson covers this product yet; the inquiry is waiting in the public pool."
    } else {
        "This inquiry has been assigned to you."
    };

    let customer = &notice.customer;
    let mut rows = vec![
        row("Inquiry No.", &notice.inquiry_no),
        row("Product", &notice.product_name),
        row("SKU", notice.sku_code.as_deref().unwrap_or("-")),
        row("Quantity", &notice.quantity.to_string()),
        row("Unit price", &price_text(notice)),
        row("Customer", &customer.name),
        row("Email", &customer.email),
    ];
    if let Some(company) = &customer.company {
        rows.push(row("Company", company));
    }
    if let Some(phone) = &customer.phone {
        rows.push(row("Phone", phone));
    }
    if let Some(country) = &customer.country {
        rows.push(row("Country", country));
    }

    let message = notice
        .message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .map(|m| format!("<p><strong>Message</strong></p><blockquote>{}</blockquote>", html_escape(m).replace('\n', "<br>")))
        .unwrap_or_default();

    let html = format!(
        "<html><body><p>{}</p><p>{}</p><table>{}</table>{}<p>The quotation draft is attached.</p></body></html>",
        greeting,
        routing,
        rows.join(""),
        message
    );
    (subject, html)
}

/// Receipt sent to the customer after submission
pub fn customer_confirmation(notice: &InquiryNotice) -> (String, String) {
    let subject = format!("We received your inquiry {}", notice.inquiry_no);

    let contact = notice
        .assignee
        .as_ref()
        .map(|a| {
            format!(
                "<p>Your sales contact is {} (<a href=\"mailto:{}\">{}</a>).</p>",
                html_escape(&a.name),
                html_escape(&a.email),
                html_escape(&a.email)
            )
        })
        .unwrap_or_else(|| "<p>Our sales team will get back to you shortly.</p>".to_string());

    let html = format!(
        "<html><body><p>Dear {},</p><p>Thank you for your interest in {}. We have received your inquiry and will reply soon.</p><table>{}{}{}</table>{}<p>{}</p></body></html>",
        html_escape(&notice.customer.name),
        html_escape(&notice.product_name),
        row("Inquiry No.", &notice.inquiry_no),
        row("Product", &notice.product_name),
        row("Quantity", &notice.quantity.to_string()),
        contact,
        html_escape(&notice.site_name)
    );
    (subject, html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::tests::sample_notice;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn customer_input_is_escaped_in_notice() {
        let mut notice = sample_notice();
        notice.customer.name = "<b>Mallory</b>".to_string();
        notice.message = Some("<img src=x onerror=alert(1)>".to_string());

        let (_, html) = salesperson_notice(&notice);
        assert!(!html.contains("<b>Mallory</b>"));
        assert!(html.contains("&lt;b&gt;Mallory&lt;/b&gt;"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn public_pool_notice_says_so() {
        let mut notice = sample_notice();
        notice.is_public = true;
        notice.assignee = None;
        let (subject, html) = salesperson_notice(&notice);
        assert!(subject.contains(&notice.inquiry_no));
        assert!(html.contains("public pool"));
        assert!(html.starts_with("<html><body><p>Hello,"));
    }

    #[test]
    fn confirmation_names_sales_contact() {
        let notice = sample_notice();
        let (subject, html) = customer_confirmation(&notice);
        assert!(subject.ends_with(&notice.inquiry_no));
        assert!(html.contains("mailto:sales@example.com"));
    }
}
