use concierge::cache::{address_cache_key, coordinate_cache_key};
use concierge::types::Category;

#[test]
fn coordinate_key_is_stable_and_grid_snapped() {
    let key1 = coordinate_cache_key(43.4769, -79.7596, &[Category::Restaurant], 3);
    let key2 = coordinate_cache_key(43.4769, -79.7596, &[Category::Restaurant], 3);
    assert_eq!(key1, key2);
    assert_eq!(key1, "rec:v1:43.477:-79.760:Restaurant");

    // Anything in the same grid cell lands on the same key.
    let nearby = coordinate_cache_key(43.4771, -79.7601, &[Category::Restaurant], 3);
    assert_eq!(nearby, key1);

    // A different cell gets a different key.
    let far = coordinate_cache_key(43.478, -79.76, &[Category::Restaurant], 3);
    assert_ne!(far, key1);
}

#[test]
fn coordinate_key_rounds_half_away_from_zero() {
    assert_eq!(
        coordinate_cache_key(0.0015, -0.0015, &[Category::All], 3),
        "rec:v1:0.002:-0.002:All"
    );
}

#[test]
fn coordinate_key_category_order_does_not_matter() {
    let ab = coordinate_cache_key(
        1.0,
        2.0,
        &[Category::Museum, Category::Bar, Category::Cafe],
        3,
    );
    let ba = coordinate_cache_key(
        1.0,
        2.0,
        &[Category::Cafe, Category::Museum, Category::Bar],
        3,
    );
    assert_eq!(ab, ba);
    assert_eq!(ab, "rec:v1:1.000:2.000:Bar+Cafe+Museum");
}

#[test]
fn single_category_uses_bare_name() {
    let key = coordinate_cache_key(1.0, 2.0, &[Category::TouristAttraction], 3);
    assert_eq!(key, "rec:v1:1.000:2.000:TouristAttraction");
}

#[test]
fn address_key_is_case_and_whitespace_insensitive() {
    let a = address_cache_key("Nowhereville", &[Category::All]);
    let b = address_cache_key("  NOWHEREVILLE  ", &[Category::All]);
    assert_eq!(a, b);
}

#[test]
fn address_key_shape() {
    let key = address_cache_key("nowhereville", &[Category::All]);
    let parts: Vec<&str> = key.split(':').collect();
    assert_eq!(parts[0], "rec");
    assert_eq!(parts[1], "v1");
    assert_eq!(parts[2], "addr");
    assert_eq!(parts[3].len(), 16);
    assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    assert_eq!(parts[4], "All");
}

#[test]
fn address_key_multi_category_uses_all_sentinel() {
    let multi = address_cache_key("x", &[Category::Bar, Category::Cafe]);
    assert!(multi.ends_with(":All"));
    let single = address_cache_key("x", &[Category::Cafe]);
    assert!(single.ends_with(":Cafe"));
}

#[test]
fn different_addresses_get_different_hashes() {
    assert_ne!(
        address_cache_key("springfield", &[Category::All]),
        address_cache_key("shelbyville", &[Category::All])
    );
}
