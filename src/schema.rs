table! {
    category (id) {
        id -> Integer,
        name -> Varchar,
    }
}

table! {
    menu (id) {
        id -> Integer,
        name -> Varchar,
    }
}

table! {
    recipe (id) {
        id -> Integer,
        name -> Varchar,
        description -> Text,
    }
}

table! {
    ingredient (id) {
        id -> Integer,
        name -> Varchar,
        presentation -> Varchar,
        purchase_price -> Double,
        category_id -> Nullable<Integer>,
        supplier_id -> Nullable<Integer>,
        image -> Nullable<Varchar>,
    }
}

table! {
    recipe_ingredient (recipe_id, ingredient_id) {
        recipe_id -> Integer,
        ingredient_id -> Integer,
        quantity_used -> Double,
        cost_of_use -> Double,
    }
}

joinable!(ingredient -> category (category_id));
joinable!(recipe_ingredient -> ingredient (ingredient_id));
joinable!(recipe_ingredient -> recipe (recipe_id));

allow_tables_to_appear_in_same_query!(category, ingredient, menu, recipe, recipe_ingredient);
