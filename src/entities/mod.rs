pub mod order;
pub mod order_item;
pub mod product;
pub mod promo_code;
pub mod promo_redemption;
pub mod stock_level;

pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
pub use promo_code::Entity as PromoCode;
pub use promo_redemption::Entity as PromoRedemption;
pub use stock_level::Entity as StockLevel;
pub use stock_level::Size;
