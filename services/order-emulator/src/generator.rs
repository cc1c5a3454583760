use chrono::{SecondsFormat, Utc};
use domain::{Delivery, Item, Order, Payment};
use rand::Rng;
use uuid::Uuid;

const DELIVERY_COST: i64 = 200;

/// Build a random order that passes validation
pub fn generate_order<R: Rng + ?Sized>(rng: &mut R) -> Order {
    let order_uid = Uuid::new_v4().simple().to_string();
    let track_number = format!("TN{}", rng.gen_range(0..1000));
    let now = Utc::now();

    let price = rng.gen_range(100..1100);
    let sale = rng.gen_range(0..50);
    let total_price = price * (100 - sale) / 100;

    Order {
        order_uid: order_uid.clone(),
        track_number: track_number.clone(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "John Doe".to_string(),
            phone: "+1234567890".to_string(),
            zip: "12345".to_string(),
            city: "Moscow".to_string(),
            address: "123 Main St".to_string(),
            region: "Central".to_string(),
            email: "john@example.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: format!("REQ{}", rng.gen_range(0..1000)),
            currency: "USD".to_string(),
            provider: "stripe".to_string(),
            amount: total_price + DELIVERY_COST,
            payment_dt: now.timestamp(),
            bank: "Sberbank".to_string(),
            delivery_cost: DELIVERY_COST,
            goods_total: total_price,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: rng.gen_range(0..1_000_000),
            track_number,
            price,
            rid: format!("RID{}", rng.gen_range(0..1000)),
            name: format!("Item {}", rng.gen_range(0..100)),
            sale,
            size: "M".to_string(),
            total_price,
            nm_id: rng.gen_range(0..1000),
            brand: "BrandX".to_string(),
            status: 202,
        }],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: format!("CUST{}", rng.gen_range(0..1000)),
        delivery_service: "UPS".to_string(),
        shardkey: "1".to_string(),
        sm_id: 99,
        date_created: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        oof_shard: "1".to_string(),
    }
}
