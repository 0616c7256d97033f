//! Integration tests for the resource table
//!
//! These tests verify that:
//! - Mutations reconcile through a re-fetch, or locally when it fails
//! - Bulk deletes report every outcome
//! - Filters, pagination and selection work together over loaded items
//! - URL-synced tables follow outside navigation

use tabula::prelude::*;

fn resource(id: &str) -> ResourceConfig {
    ResourcesConfig::default_config()
        .require_resource(id)
        .unwrap()
        .clone()
}

fn captions() -> Vec<Value> {
    vec![
        json!({"_id": "c1", "national": "Bonjour", "foreign": "Hello", "created_at": "2024-01-15T10:00:00Z"}),
        json!({"_id": "c2", "national": "Monde", "foreign": "World", "created_at": "2024-02-01T10:00:00Z"}),
        json!({"_id": "c3", "national": "Chat", "foreign": "Cat", "created_at": "2024-03-10T10:00:00Z"}),
    ]
}

fn countries() -> Vec<Value> {
    let rows = [
        ("FRA", "France", "Europe", "EUR", "Euro", true),
        ("DEU", "Germany", "Europe", "EUR", "Euro", true),
        ("JPN", "Japan", "Asia", "JPY", "Japanese yen", true),
        ("IND", "India", "Asia", "INR", "Indian rupee", true),
        ("PRI", "Puerto Rico", "Americas", "USD", "United States dollar", false),
        ("KEN", "Kenya", "Africa", "KES", "Kenyan shilling", true),
    ];
    rows.iter()
        .map(|(cca3, name, region, code, currency, independent)| {
            json!({
                "cca3": cca3,
                "name": {"common": name},
                "region": region,
                "currencies": {code.to_string(): {"name": currency}},
                "independent": independent,
            })
        })
        .collect()
}

async fn captions_table() -> (ResourceTable, InMemoryResourceApi) {
    let api = InMemoryResourceApi::with_items("captions", captions());
    let mut table = ResourceTable::new(resource("captions"), Arc::new(api.clone()), None).unwrap();
    table.fetch().await.unwrap();
    table.take_notifications();
    (table, api)
}

mod mutation_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_refetches() {
        let (mut table, api) = captions_table().await;

        let created = table
            .create_item(json!({"national": "Chien", "foreign": "Dog"}))
            .await
            .unwrap();
        assert_eq!(api.len(), 4);
        assert_eq!(table.items().len(), 4);
        assert!(table.items().iter().any(|i| i["id"] == created["id"]));

        let notifications = table.take_notifications();
        assert_eq!(notifications[0].kind, NotificationKind::Success);
        assert_eq!(notifications[0].message, "Item created successfully");
    }

    #[tokio::test]
    async fn test_create_prepends_when_refetch_fails() {
        let (mut table, api) = captions_table().await;
        api.set_failing(
            ApiOperation::List,
            ApiError::Network {
                message: "offline".into(),
            },
        );

        table
            .create_item(json!({"national": "Chien", "foreign": "Dog"}))
            .await
            .unwrap();
        assert_eq!(table.items().len(), 4);
        assert_eq!(table.items()[0]["national"], "Chien");
    }

    #[tokio::test]
    async fn test_failed_create_keeps_state() {
        let (mut table, api) = captions_table().await;
        api.set_failing(
            ApiOperation::Create,
            ApiError::Api {
                message: "Word exists".into(),
            },
        );

        let err = table
            .create_item(json!({"national": "Chien", "foreign": "Dog"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "API_ERROR");
        assert_eq!(table.items().len(), 3);

        let notifications = table.take_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Error);
        assert_eq!(notifications[0].message, "Word exists");
    }

    #[tokio::test]
    async fn test_delete_removes_item_and_selection() {
        let (mut table, _api) = captions_table().await;
        table.toggle_selected("c2").unwrap();

        table.delete_item("c2").await.unwrap();
        assert_eq!(table.items().len(), 2);
        assert!(!table.selection().is_selected("c2"));

        let err = table.delete_item("").await.unwrap_err();
        assert_eq!(err.error_code(), "MISSING_ID");
    }

    #[tokio::test]
    async fn test_bulk_delete_partial_failure() {
        let (mut table, _api) = captions_table().await;

        let report = table
            .bulk_delete_items(&["c1".to_string(), "gone".to_string()])
            .await
            .unwrap();
        assert_eq!(report.deleted, vec!["c1".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
        assert_eq!(table.items().len(), 2);

        let notifications = table.take_notifications();
        assert_eq!(notifications[0].kind, NotificationKind::Error);
        assert!(notifications[0].message.starts_with("Deleted 1 item(s), but 1 failed"));
    }

    #[tokio::test]
    async fn test_bulk_delete_selected() {
        let (mut table, api) = captions_table().await;
        table.toggle_all_visible().unwrap();
        assert!(table.is_all_visible_selected());
        assert_eq!(table.selected_items().len(), 3);

        let report = table.bulk_delete_selected().await.unwrap();
        assert!(report.is_complete());
        assert!(api.is_empty());
        assert!(table.selection().is_empty());
        assert_eq!(table.view_state(), ViewState::Empty);
        assert_eq!(
            table.take_notifications()[0].message,
            "Successfully deleted 3 item(s)"
        );
    }
}

mod view_tests {
    use super::*;

    #[tokio::test]
    async fn test_filtering_and_no_matches() {
        let (mut table, _api) = captions_table().await;
        assert_eq!(table.view_state(), ViewState::Populated);

        table
            .set_filter("search", Some(FilterValue::text("hello")))
            .unwrap();
        let names: Vec<_> = table.filtered_items().iter().map(|i| i["national"].clone()).collect();
        assert_eq!(names, vec![json!("Bonjour")]);

        table
            .set_filter("search", Some(FilterValue::text("zebra")))
            .unwrap();
        assert_eq!(table.view_state(), ViewState::NoMatches);

        table.clear_filters();
        assert_eq!(table.filtered_items().len(), 3);
    }

    #[tokio::test]
    async fn test_date_range_and_sort_by_select() {
        let (mut table, _api) = captions_table().await;

        table
            .set_filter(
                "created_at",
                Some(FilterValue::range(Some("2024-01-01"), Some("2024-02-28"))),
            )
            .unwrap();
        table
            .set_filter("sortBy", Some(FilterValue::text("foreign")))
            .unwrap();

        let foreign: Vec<_> = table.filtered_items().iter().map(|i| i["foreign"].clone()).collect();
        assert_eq!(foreign, vec![json!("Hello"), json!("World")]);
        // the date range and the sort column
        assert_eq!(table.active_filters_count(), 2);
    }

    #[tokio::test]
    async fn test_countries_url_synced_table() {
        let port = Arc::new(InMemoryQueryPort::with_query("region=Europe&pageSize=1&page=2"));
        let api = InMemoryResourceApi::with_items("countries", countries());
        let mut table = ResourceTable::new(resource("countries"), Arc::new(api), Some(port.clone())).unwrap();
        table.fetch().await.unwrap();

        let page = table.page();
        assert_eq!(page.pagination.total_items, 2);
        assert_eq!(page.page(), 2);
        assert_eq!(page.items[0]["name"]["common"], "Germany");
        assert_eq!(page.items[0]["id"], "DEU");

        table
            .set_filter("currency", Some(FilterValue::text("jpy")))
            .unwrap();
        assert_eq!(port.read().get("page"), Some("1"));
        assert!(table.filtered_items().is_empty());

        port.navigate("region=Americas");
        assert!(table.on_location_change());
        let names: Vec<_> = table
            .filtered_items()
            .iter()
            .map(|i| i["name"]["common"].clone())
            .collect();
        assert_eq!(names, vec![json!("Puerto Rico")]);
    }

    #[tokio::test]
    async fn test_generated_filter_options() {
        let api = InMemoryResourceApi::with_items("countries", countries());
        let mut table = ResourceTable::new(resource("countries"), Arc::new(api), None).unwrap();
        table.fetch().await.unwrap();

        let regions: Vec<_> = table
            .filter_options("region")
            .unwrap()
            .into_iter()
            .map(|o| o.label)
            .collect();
        assert_eq!(regions, vec!["All Regions", "Africa", "Americas", "Asia", "Europe"]);

        let currencies = table.filter_options("currency").unwrap();
        assert_eq!(currencies[0].value, "");
        assert_eq!(currencies[1].value, "EUR");
        assert_eq!(currencies[1].label, "EUR - Euro");

        assert!(table.filter_options("population").is_err());
    }

    #[tokio::test]
    async fn test_paging_through_filtered_items() {
        let (mut table, _api) = captions_table().await;
        table.set_page_size(2);
        assert_eq!(table.page().items.len(), 2);

        table.next_page();
        assert_eq!(table.pagination_meta().page, 2);
        assert_eq!(table.page().items.len(), 1);
        table.next_page();
        assert_eq!(table.pagination_meta().page, 2);

        table.prev_page();
        assert_eq!(table.pagination_meta().page, 1);

        table.go_to_page(0);
        assert_eq!(table.pagination_meta().page, 1);
    }
}
