/// Instruction sent with every receipt image.
pub const EXTRACTION_PROMPT: &str = r#"You are reading a photo of a shopping receipt.
Extract the following and answer with a single JSON object, nothing else:

{
  "store_name": "name of the store or merchant",
  "items": [{"item": "product name", "price": "price as printed"}],
  "purchase_date": "date as printed, e.g. 28.04.2025",
  "purchase_time": "time as printed, e.g. 12:01:24",
  "payment_method": "cash, card, ...",
  "currency": "three-letter ISO code such as EUR or USD",
  "total_amount": "total as printed"
}

Copy prices exactly as they appear, including the decimal separator.
Use null for anything you cannot read. Do not invent items."#;
