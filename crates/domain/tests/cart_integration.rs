//! Integration tests for carts and checkout.
//!
//! These run the cart service and order factory together over one in-memory
//! event store and catalog, the way the API wires them.

use std::sync::Arc;

use common::{AggregateId, UserId};
use domain::{
    AddItem, Aggregate, CartEvent, CartService, CatalogLookup, Checkout, ClearCart,
    CommandHandler, DEFAULT_CATALOG_TIMEOUT, DomainError, DomainEvent, ErrorKind,
    InMemoryCatalog, Money, Order, OrderFactory, Product, SetQuantity, UserLocks,
};
use event_store::{EventStore, InMemoryEventStore};

struct Shop {
    store: InMemoryEventStore,
    catalog: InMemoryCatalog,
    carts: Arc<CartService<InMemoryEventStore>>,
    orders: Arc<OrderFactory<InMemoryEventStore>>,
}

fn shop() -> Shop {
    let store = InMemoryEventStore::new();
    let catalog = InMemoryCatalog::with_products([
        Product::new("A", "Mug", Money::from_dollars(10)),
        Product::new("B", "Pen", Money::from_dollars(5)),
        Product::new("C", "Notebook", Money::from_cents(350)),
    ]);
    let lookup = CatalogLookup::new(Arc::new(catalog.clone()), DEFAULT_CATALOG_TIMEOUT);
    let locks = UserLocks::new();

    Shop {
        carts: Arc::new(CartService::new(
            store.clone(),
            lookup.clone(),
            locks.clone(),
        )),
        orders: Arc::new(OrderFactory::new(store.clone(), lookup, locks)),
        store,
        catalog,
    }
}

async fn event_types(store: &InMemoryEventStore, id: AggregateId) -> Vec<String> {
    store
        .get_events_for_aggregate(id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

mod scenario {
    use super::*;

    #[tokio::test]
    async fn add_add_remove_checkout() {
        let shop = shop();
        let user = UserId::new();

        let cart = shop.carts.get(user).await.unwrap();
        assert!(!cart.exists());

        let result = shop.carts.add_item(AddItem::new(user, "A", 2)).await.unwrap();
        assert_eq!(result.aggregate.total_amount(), Money::from_dollars(20));

        let result = shop.carts.add_item(AddItem::new(user, "B", 1)).await.unwrap();
        assert_eq!(result.aggregate.total_amount(), Money::from_dollars(25));

        let result = shop
            .carts
            .set_quantity(SetQuantity::new(user, "A", 0))
            .await
            .unwrap();
        let cart = result.aggregate;
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].product_id.as_str(), "B");
        assert_eq!(cart.lines()[0].quantity, 1);
        assert_eq!(cart.total_amount(), Money::from_dollars(5));

        let order = shop.orders.checkout(Checkout::new(user)).await.unwrap();
        assert_eq!(order.lines().len(), 1);
        assert_eq!(order.lines()[0].product_id.as_str(), "B");
        assert_eq!(order.lines()[0].unit_price, Money::from_dollars(5));
        assert_eq!(order.lines()[0].quantity, 1);
        assert_eq!(order.total_amount(), Money::from_dollars(5));
        assert_eq!(order.user_id(), Some(user));

        let cart = shop.carts.get(user).await.unwrap();
        assert!(!cart.exists());
        assert!(cart.lines().is_empty());
    }

    #[tokio::test]
    async fn cart_stream_records_every_step() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 1)).await.unwrap();
        shop.carts.clear(ClearCart::new(user)).await.unwrap();

        let types = event_types(&shop.store, AggregateId::cart_of(user)).await;
        assert_eq!(
            types,
            vec!["CartOpened", "ItemAdded", "CartRepriced", "CartCleared"]
        );
    }
}

mod totals {
    use super::*;

    #[tokio::test]
    async fn total_tracks_current_catalog_price_at_last_mutation() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 2)).await.unwrap();
        shop.carts.add_item(AddItem::new(user, "C", 3)).await.unwrap();

        shop.catalog
            .set_price(&"A".into(), Money::from_dollars(11))
            .await;
        shop.catalog.set_price(&"C".into(), Money::from_cents(400)).await;

        // Stored total is unchanged until the next mutation.
        let cart = shop.carts.get(user).await.unwrap();
        assert_eq!(cart.total_amount(), Money::from_cents(2000 + 1050));

        let result = shop.carts.add_item(AddItem::new(user, "B", 1)).await.unwrap();
        let expected: Money = result
            .aggregate
            .lines()
            .iter()
            .map(|line| line.line_total())
            .sum();
        assert_eq!(expected, Money::from_cents(2200 + 1200 + 500));
        assert_eq!(result.aggregate.total_amount(), expected);
    }

    #[tokio::test]
    async fn set_quantity_twice_is_idempotent() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 1)).await.unwrap();

        let first = shop
            .carts
            .set_quantity(SetQuantity::new(user, "A", 3))
            .await
            .unwrap();
        let second = shop
            .carts
            .set_quantity(SetQuantity::new(user, "A", 3))
            .await
            .unwrap();

        assert!(second.events.is_empty());
        assert_eq!(second.new_version, first.new_version);
        assert_eq!(second.aggregate.lines(), first.aggregate.lines());
        assert_eq!(
            second.aggregate.total_amount(),
            first.aggregate.total_amount()
        );
    }

    #[tokio::test]
    async fn removing_last_line_makes_cart_absent() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 1)).await.unwrap();

        shop.carts
            .set_quantity(SetQuantity::new(user, "A", 0))
            .await
            .unwrap();

        let cart = shop.carts.get(user).await.unwrap();
        assert!(!cart.exists());
        assert_eq!(cart.total_amount(), Money::zero());

        let err = shop
            .carts
            .set_quantity(SetQuantity::new(user, "A", 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Cart(domain::CartError::CartNotFound)
        ));
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn checkout_absent_cart_creates_no_order() {
        let shop = shop();
        let user = UserId::new();

        let err = shop.orders.checkout(Checkout::new(user)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EmptyCart);
        assert_eq!(shop.store.event_count().await, 0);
    }

    #[tokio::test]
    async fn checkout_after_clear_fails_empty() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 1)).await.unwrap();
        shop.carts.clear(ClearCart::new(user)).await.unwrap();

        let err = shop.orders.checkout(Checkout::new(user)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCart);
    }

    #[tokio::test]
    async fn order_survives_later_catalog_changes() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 1)).await.unwrap();
        let order = shop.orders.checkout(Checkout::new(user)).await.unwrap();

        shop.catalog.set_price(&"A".into(), Money::from_dollars(99)).await;
        shop.catalog.remove(&"A".into()).await;

        let stored = CommandHandler::<_, Order>::new(shop.store.clone())
            .load(order.id().unwrap())
            .await
            .unwrap();
        assert_eq!(stored.total_amount(), Money::from_dollars(10));
        assert_eq!(stored.lines()[0].title, "Mug");
    }

    #[tokio::test]
    async fn missing_product_at_checkout_is_not_found() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 1)).await.unwrap();
        shop.catalog.remove(&"A".into()).await;

        let err = shop.orders.checkout(Checkout::new(user)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(shop.carts.get(user).await.unwrap().exists());
    }

    #[tokio::test]
    async fn cart_can_be_reused_after_checkout() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 1)).await.unwrap();
        shop.orders.checkout(Checkout::new(user)).await.unwrap();

        let result = shop.carts.add_item(AddItem::new(user, "B", 2)).await.unwrap();
        assert_eq!(result.aggregate.lines().len(), 1);
        assert_eq!(result.aggregate.total_amount(), Money::from_dollars(10));
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_of_same_product_are_not_lost() {
        let shop = shop();
        let user = UserId::new();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let carts = shop.carts.clone();
                tokio::spawn(async move { carts.add_item(AddItem::new(user, "A", 1)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let cart = shop.carts.get(user).await.unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 20);
        assert_eq!(cart.total_amount(), Money::from_dollars(200));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_produce_exactly_one_order() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 2)).await.unwrap();
        shop.carts.add_item(AddItem::new(user, "B", 1)).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let orders = shop.orders.clone();
                tokio::spawn(async move { orders.checkout(Checkout::new(user)).await })
            })
            .collect();

        let mut placed = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(order) => placed.push(order),
                Err(e) => assert_eq!(e.kind(), ErrorKind::EmptyCart),
            }
        }

        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].total_amount(), Money::from_dollars(25));
        assert!(!shop.carts.get(user).await.unwrap().exists());

        let cart_events = event_types(&shop.store, AggregateId::cart_of(user)).await;
        let checkouts = cart_events
            .iter()
            .filter(|t| t.as_str() == CartEvent::cart_checked_out(AggregateId::new()).event_type())
            .count();
        assert_eq!(checkouts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn checkout_racing_with_adds_never_loses_an_item() {
        let shop = shop();
        let user = UserId::new();
        shop.carts.add_item(AddItem::new(user, "A", 1)).await.unwrap();

        let adder = {
            let carts = shop.carts.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    carts.add_item(AddItem::new(user, "B", 1)).await.unwrap();
                }
            })
        };
        let order = shop.orders.checkout(Checkout::new(user)).await.unwrap();
        adder.await.unwrap();

        // Every B either went into the order or is still in the cart.
        let ordered_b = order
            .lines()
            .iter()
            .find(|line| line.product_id.as_str() == "B")
            .map_or(0, |line| line.quantity);
        let cart = shop.carts.get(user).await.unwrap();
        let remaining_b = cart.line(&"B".into()).map_or(0, |line| line.quantity);
        assert_eq!(ordered_b + remaining_b, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_users_proceed_independently() {
        let shop = shop();
        let users: Vec<UserId> = (0..10).map(|_| UserId::new()).collect();

        let tasks: Vec<_> = users
            .iter()
            .map(|&user| {
                let carts = shop.carts.clone();
                let orders = shop.orders.clone();
                tokio::spawn(async move {
                    carts.add_item(AddItem::new(user, "C", 2)).await?;
                    orders.checkout(Checkout::new(user)).await
                })
            })
            .collect();

        for task in tasks {
            let order = task.await.unwrap().unwrap();
            assert_eq!(order.total_amount(), Money::from_cents(700));
        }
        assert_eq!(shop.store.event_count().await, users.len() * 5);
    }
}
