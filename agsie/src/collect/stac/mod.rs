pub mod stac_collect;
