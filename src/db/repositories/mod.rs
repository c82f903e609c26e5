mod entries;
mod products;
